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
 *  Composes the upstream nameserver list: the explicit backend list from
 *  config, optionally extended with whatever a resolv.conf-shaped file
 *  says. '#' in a server entry is a port separator, as with dnsmasq - a
 *  literal ':' is not assumed, since IPv6 literals contain plenty of those.
 */
use std::net::SocketAddr;

const DEFAULT_PORT: &str = "53";

pub struct Nameservers {
    servers: Vec<String>,
}

impl Nameservers {
    /// Builds the nameserver list. If `exclusively` is true, only
    /// `backend_resolvers` is used; otherwise it is extended with the
    /// system resolver entries parsed out of `resolv_conf_contents`.
    pub fn build(
        backend_resolvers: &[String],
        exclusively: bool,
        resolv_conf_contents: Option<&str>,
    ) -> Self {
        let mut servers: Vec<String> = backend_resolvers
            .iter()
            .map(|s| Self::with_port(s))
            .collect();

        if !exclusively {
            if let Some(contents) = resolv_conf_contents {
                servers.extend(Self::parse_resolv_conf(contents));
            }
        }

        Nameservers { servers }
    }

    fn with_port(server: &str) -> String {
        if let Some(idx) = server.rfind('#') {
            format!("{}:{}", &server[..idx], &server[idx + 1..])
        } else {
            format!("{}:{}", server, DEFAULT_PORT)
        }
    }

    fn parse_resolv_conf(contents: &str) -> Vec<String> {
        contents
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix("nameserver"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::with_port)
            .collect()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.servers
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn to_socket_addrs(&self) -> Vec<SocketAddr> {
        self.servers
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn explicit_port_via_hash_syntax() {
        assert_eq!(Nameservers::with_port("8.8.8.8#5353"), "8.8.8.8:5353");
    }

    #[test]
    fn default_port_appended_when_absent() {
        assert_eq!(Nameservers::with_port("8.8.8.8"), "8.8.8.8:53");
    }

    #[test]
    fn exclusively_ignores_resolv_conf() {
        let ns = Nameservers::build(
            &["8.8.8.8".to_string()],
            true,
            Some("nameserver 9.9.9.9\n"),
        );
        assert_eq!(ns.as_slice(), &["8.8.8.8:53".to_string()]);
    }

    #[test]
    fn non_exclusive_appends_resolv_conf_entries() {
        let ns = Nameservers::build(
            &["8.8.8.8".to_string()],
            false,
            Some("nameserver 9.9.9.9\nnameserver 1.1.1.1\n# comment\n"),
        );
        assert_eq!(
            ns.as_slice(),
            &[
                "8.8.8.8:53".to_string(),
                "9.9.9.9:53".to_string(),
                "1.1.1.1:53".to_string(),
            ]
        );
    }
}
