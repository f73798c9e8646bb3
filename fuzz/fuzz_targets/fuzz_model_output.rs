// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;

use ewaste_scanner::classifier::extract_json;
use ewaste_scanner::normalize::normalize;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(Value::Object(fields)) = extract_json(text) {
        let out = normalize(fields);
        for key in ["components", "harmful_substances"] {
            if let Some(value) = out.get(key) {
                assert!(value.is_array());
            }
        }
        if let Some(value) = out.get("recyclable") {
            assert!(value.is_boolean());
        }
    }
});
