//! Bridges `tokio_util::sync::CancellationToken` to the domain crate's
//! tokio-free `CancelSignal` trait (spec §5: "a cancel signal (token/context)
//! is threaded into every pipeline call and every HTTP call").

use imgforge_domain::ports::CancelSignal;
use tokio_util::sync::CancellationToken;

pub struct TokioCancelSignal(pub CancellationToken);

impl CancelSignal for TokioCancelSignal {
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflects_cancellation() {
        let token = CancellationToken::new();
        let signal = TokioCancelSignal(token.clone());
        assert!(!signal.is_cancelled());
        token.cancel();
        assert!(signal.is_cancelled());
    }
}
