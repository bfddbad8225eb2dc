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
 *  Fingerprints are hex MD5 over the concatenation of the raw query label,
 *  the trimmed FQDN, and (remote mode only) the client IP. The same
 *  concatenation is used for blocklist lookups in local-resolver mode, minus
 *  the client IP term.
 */

/// Computes the remote-mode fingerprint: md5(query || client_ip || fqdn).
pub fn remote_fingerprint(query: &str, client_ip: &str, trimmed_fqdn: &str) -> String {
    let mut buf = String::with_capacity(query.len() + client_ip.len() + trimmed_fqdn.len());
    buf.push_str(query);
    buf.push_str(client_ip);
    buf.push_str(trimmed_fqdn);
    hex_md5(buf.as_bytes())
}

/// Computes the local-mode fingerprint: md5(trimmed_fqdn).
pub fn local_fingerprint(trimmed_fqdn: &str) -> String {
    hex_md5(trimmed_fqdn.as_bytes())
}

fn hex_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Strips a single trailing '.' from a name, matching the DNS UnFqdn
/// convention used throughout the decision pipeline.
pub fn trim_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fingerprint_stability() {
        let a = remote_fingerprint("example.com", "192.0.2.1", "example.com");
        let b = remote_fingerprint("example.com", "192.0.2.1", "example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_matches_manual_concatenation() {
        let expected = format!("{:x}", md5::compute(b"qexample.com192.0.2.1example.com"));
        assert_eq!(
            remote_fingerprint("qexample.com", "192.0.2.1", "example.com"),
            expected
        );
    }

    #[test]
    fn local_fingerprint_has_no_ip_component() {
        let with_ip = remote_fingerprint("", "", "evil.test");
        let local = local_fingerprint("evil.test");
        assert_eq!(with_ip, local);
    }

    #[test]
    fn trim_fqdn_strips_single_dot() {
        assert_eq!(trim_fqdn("example.com."), "example.com");
        assert_eq!(trim_fqdn("example.com"), "example.com");
    }
}
