use tokio::sync::watch;

use crate::bridge::sync::ColorSource;
use crate::bridge::transform::CapturedColor;
use crate::bridge::BridgeError;

pub mod protocol;
pub mod stream;

/// Read side of the Hyperion LED stream. The stream task replaces the
/// watch value on every frame, so readers always see the newest sample
/// and stale ones are dropped rather than queued.
#[derive(Clone)]
pub struct HyperionSource {
    rx: watch::Receiver<Option<CapturedColor>>,
}

impl HyperionSource {
    pub fn new(rx: watch::Receiver<Option<CapturedColor>>) -> Self {
        HyperionSource { rx }
    }
}

impl ColorSource for HyperionSource {
    fn latest(&self) -> Result<CapturedColor, BridgeError> {
        (*self.rx.borrow()).ok_or(BridgeError::SourceUnavailable)
    }
}
