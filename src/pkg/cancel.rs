use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::pkg::error::{ResolveError, Result};

// Shared flag polled at directory visits, archive scans and resolver passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;
    use crate::pkg::error::ResolveError;

    #[test]
    fn clones_share_the_flag() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.cancel();
        assert!(a.is_cancelled());
        assert!(matches!(a.check(), Err(ResolveError::Cancelled)));
    }
}
