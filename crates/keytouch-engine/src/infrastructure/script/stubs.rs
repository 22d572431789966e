//! Stand-in collaborators for the image-matching and frame-grab ports.
//!
//! [`NullImageMatcher`] is what the headless runner installs: no template
//! matching backend is linked, so every search reports "not found".  The
//! other two are deterministic doubles used by unit and integration tests.

use std::sync::{Arc, Mutex};

use keytouch_core::RectF;
use tracing::warn;

use crate::application::lock;
use crate::application::script_bridge::{Frame, FrameGrabber, ImageMatcher, MatchResult};

/// Reports every template as missing.
#[derive(Debug, Default)]
pub struct NullImageMatcher;

impl ImageMatcher for NullImageMatcher {
    fn find(&self, _frame: &Frame, template: &str, _region: RectF, _threshold: f64) -> MatchResult {
        warn!(template, "image matching is not available in this build");
        MatchResult::not_found()
    }
}

/// Always returns the same result and records each query.
#[derive(Debug, Default)]
pub struct StubImageMatcher {
    result: MatchResult,
    queries: Mutex<Vec<(String, RectF, f64)>>,
}

impl StubImageMatcher {
    pub fn returning(result: MatchResult) -> Self {
        Self {
            result,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// `(template, region, threshold)` of every call so far.
    pub fn queries(&self) -> Vec<(String, RectF, f64)> {
        lock(&self.queries).clone()
    }
}

impl ImageMatcher for StubImageMatcher {
    fn find(&self, _frame: &Frame, template: &str, region: RectF, threshold: f64) -> MatchResult {
        lock(&self.queries).push((template.to_string(), region, threshold));
        self.result
    }
}

/// Serves one fixed frame.
#[derive(Debug, Clone)]
pub struct StaticFrameGrabber {
    frame: Frame,
}

impl StaticFrameGrabber {
    /// A `width` x `height` mid-grey frame.
    pub fn solid(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize) * 4;
        Self {
            frame: Frame {
                width,
                height,
                rgba: Arc::from(vec![0x80; len]),
            },
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame.clone()
    }
}

impl FrameGrabber for StaticFrameGrabber {
    fn grab(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}
