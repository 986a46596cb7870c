#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use unibio_core::{FailureReason, HelpReason};
use unibio_dispatch::{
    Decoded, FrameworkCodes, NativeFailure, NativeSignal, SamsungPassCodes, VendorCodes,
};

#[derive(Debug, Arbitrary)]
enum Signal {
    Error { code: i32, message: Option<String> },
    Help { code: i32, message: Option<String> },
    Acquired { code: i32 },
    Succeeded,
    Failed,
    Status { code: i32 },
}

impl From<Signal> for NativeSignal {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Error { code, message } => NativeSignal::Error { code, message },
            Signal::Help { code, message } => NativeSignal::Help { code, message },
            Signal::Acquired { code } => NativeSignal::Acquired { code },
            Signal::Succeeded => NativeSignal::Succeeded,
            Signal::Failed => NativeSignal::Failed,
            Signal::Status { code } => NativeSignal::Status { code },
        }
    }
}

fn check(codes: &dyn VendorCodes, signal: &NativeSignal) {
    let decoded = codes.decode(signal);

    match (signal, &decoded) {
        // Help and progress never end a probe
        (NativeSignal::Help { code, message }, Decoded::Help(reason, text)) => {
            assert_eq!(*reason, HelpReason::from_code(*code));
            assert_eq!(message, text);
        }
        (NativeSignal::Help { .. }, other) => panic!("help decoded as {:?}", other),
        (NativeSignal::Acquired { code }, Decoded::Progress(progress)) => {
            assert_eq!(code, progress)
        }
        (NativeSignal::Acquired { .. }, other) => panic!("progress decoded as {:?}", other),
        (NativeSignal::Succeeded, Decoded::Success) => {}
        (NativeSignal::Succeeded, other) => panic!("success decoded as {:?}", other),
        _ => {}
    }

    // Terminal reasons stay inside the taxonomy
    if let Decoded::Terminal(NativeFailure::Reason(reason)) = decoded {
        assert!(FailureReason::ALL.contains(&reason));
        assert_ne!(reason, FailureReason::LockedOut);
    }
}

fuzz_target!(|signals: Vec<Signal>| {
    for signal in signals {
        let signal = NativeSignal::from(signal);
        check(&FrameworkCodes, &signal);
        check(&SamsungPassCodes, &signal);
    }
});
