/*   Copyright 2024 sinkdns contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 *  SPDX-License-Identifier: Apache-2.0
 *
 *  The single policy verdict shared by the blocklist tables and the
 *  per-answer cache. The upstream project carried two shapes for this (a
 *  bool-valued remote-mode cache and a byte-valued local-mode Action); we
 *  keep one enum and let the remote-mode cache store the two-valued subset
 *  of it.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    Black = 0,
    White = 1,
    Log = 2,
}

impl TryFrom<i32> for Action {
    type Error = crate::error::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Action::Black),
            1 => Ok(Action::White),
            2 => Ok(Action::Log),
            other => Err(crate::error::Error::Decode(format!(
                "unknown action wire value {}",
                other
            ))),
        }
    }
}

impl From<Action> for i32 {
    fn from(a: Action) -> i32 {
        a as i32
    }
}

/// The two-state decision a remote-mode Oraculum lookup resolves to. Kept
/// distinct from `Action` because there is no `Log` concept in the per-answer
/// cache: Oraculum's API returns a plain sinkhole/no-sinkhole boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Sink,
    Pass,
}

impl Verdict {
    pub fn is_sink(self) -> bool {
        matches!(self, Verdict::Sink)
    }
}

impl From<bool> for Verdict {
    fn from(b: bool) -> Self {
        if b {
            Verdict::Sink
        } else {
            Verdict::Pass
        }
    }
}
