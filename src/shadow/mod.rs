// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device shadow payloads and topics.
//!
//! The agent reports a single property into the shadow document:
//!
//! ```json
//! {"state": {"reported": {"status": "on"}}}
//! ```
//!
//! [`ShadowCodec`] produces that envelope and reads it back. Decoding also
//! accepts the bare `{"status": ...}` form used by status-request
//! acknowledgements, and the boolean and `0`/`1` encodings written by older
//! producers.

mod codec;
mod topics;

pub use codec::{ShadowCodec, ShadowUpdate};
pub use topics::ShadowTopics;
