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
 *  Low level UDP/TCP socket helpers shared by the listener and the racing
 *  resolver. Deliberately thin: both callers own their own deadlines and
 *  buffers, this crate just gives them a socket that enforces them.
 */
pub mod tcp;
pub mod udp;

pub use tcp::TcpSocket;
pub use udp::UdpSocket;
