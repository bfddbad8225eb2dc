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
 *  mTLS credential material for local-resolver mode. Decoding the
 *  base64-encoded PEM configuration values is out of scope here (see
 *  SPEC_FULL.md 0.4) — this module only holds the already-decoded bytes and
 *  turns them into what reqwest's client builder wants.
 */

/// Already-decoded client certificate/key and CA pool bytes (PEM). The
/// caller is responsible for base64-decoding the configuration values before
/// constructing this.
pub struct TlsMaterial {
    /// PEM-encoded client certificate chain followed by the private key,
    /// concatenated the way `reqwest::Identity::from_pem` expects.
    pub client_identity_pem: Vec<u8>,
    pub ca_cert_pem: Vec<u8>,
    pub insecure_skip_verify: bool,
}

impl TlsMaterial {
    pub fn new(client_crt_pem: &[u8], client_key_pem: &[u8], ca_cert_pem: Vec<u8>) -> Self {
        let mut identity = Vec::with_capacity(client_crt_pem.len() + client_key_pem.len());
        identity.extend_from_slice(client_crt_pem);
        identity.extend_from_slice(client_key_pem);
        TlsMaterial {
            client_identity_pem: identity,
            ca_cert_pem,
            insecure_skip_verify: false,
        }
    }

    pub fn with_insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_verify = insecure;
        self
    }

    pub fn identity(&self) -> crate::error::Result<reqwest::Identity> {
        reqwest::Identity::from_pem(&self.client_identity_pem)
            .map_err(|e| crate::error::Error::Transport(e.to_string()))
    }

    pub fn ca_certificate(&self) -> crate::error::Result<reqwest::Certificate> {
        reqwest::Certificate::from_pem(&self.ca_cert_pem)
            .map_err(|e| crate::error::Error::Transport(e.to_string()))
    }
}
