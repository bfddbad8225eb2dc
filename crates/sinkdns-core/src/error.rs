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
 *  Unified error type for the sinkdns core. Every fallible operation in this
 *  crate returns one of these variants rather than a component-local error
 *  enum, so the decision pipeline can match on it once.
 */

#[derive(Debug)]
pub enum Error {
    /// Key absent from a cache or snapshot table.
    KeyNotFound(String),
    /// Key was present but its TTL has elapsed; the entry was removed as a
    /// side effect of observing this.
    KeyExpired(String),
    /// `ExpiringCache::set` on a cache at its configured max, for a key that
    /// was not already present.
    CacheFull,
    /// On-disk snapshot file missing or unreadable.
    CacheFileNotFound(std::path::PathBuf),
    /// No configured upstream produced a usable answer.
    Resolve {
        qname: String,
        net: &'static str,
        nameservers: Vec<String>,
    },
    /// Oraculum responded with a non-200 status.
    Core { status: u16 },
    /// Transport-level failure talking to Oraculum or the cache URL.
    Transport(String),
    /// JSON/protobuf payload did not decode.
    Decode(String),
    /// `X-file-md5` response header did not match the downloaded body.
    Md5Mismatch { expected: String, actual: String },
    /// Generic I/O failure (socket bind, disk write, ...).
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::KeyNotFound(k) => write!(f, "{} not found", k),
            Error::KeyExpired(k) => write!(f, "{} expired", k),
            Error::CacheFull => write!(f, "cache is full"),
            Error::CacheFileNotFound(p) => write!(f, "{} not found", p.display()),
            Error::Resolve {
                qname,
                net,
                nameservers,
            } => write!(
                f,
                "{} resolv failed on {} ({})",
                qname,
                nameservers.join("; "),
                net
            ),
            Error::Core { status } => write!(f, "oraculum status code {}", status),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Decode(msg) => write!(f, "decode error: {}", msg),
            Error::Md5Mismatch { expected, actual } => write!(
                f,
                "md5 mismatch: header said {}, body hashed to {}",
                expected, actual
            ),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
