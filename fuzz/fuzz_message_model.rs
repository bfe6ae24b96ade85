//! Fuzz target for message validation.
//!
//! Run with: cargo +nightly fuzz run fuzz_message_model
//!
//! Any non-null JSON value must either validate or carry a validation error.

#![no_main]

use convokit_core::MessageModel;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let is_null = value.is_null();
    let model = MessageModel::new(value);
    if !is_null {
        assert_eq!(model.is_valid(), model.validation_error().is_none());
    }
    let _ = model.into_payload_or_raw();
});
