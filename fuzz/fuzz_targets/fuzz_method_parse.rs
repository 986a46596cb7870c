#![no_main]

use libfuzzer_sys::fuzz_target;
use unibio_core::{BiometricMethod, BiometricType, HelpReason, ModuleTag};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(method) = text.parse::<BiometricMethod>() {
            // Whatever parsed must be reachable by tag and by name
            assert_eq!(BiometricMethod::from_tag(method.tag()).unwrap(), method);
            assert_eq!(method.name().parse::<BiometricMethod>().unwrap(), method);
        }
        if let Ok(ty) = text.parse::<BiometricType>() {
            assert_eq!(ty.to_string().parse::<BiometricType>().unwrap(), ty);
        }
    }

    if data.len() >= 4 {
        let raw = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if let Ok(method) = BiometricMethod::from_tag(ModuleTag(raw)) {
            assert_eq!(method.tag(), ModuleTag(raw));
        }

        let code = raw as i32;
        let reason = HelpReason::from_code(code);
        if (0..=5).contains(&code) {
            assert_eq!(reason.code(), Some(code));
        } else {
            assert!(matches!(reason, HelpReason::Vendor | HelpReason::Hint));
        }
    }
});
