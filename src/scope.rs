//! Per-message decoding scope shared by nested decoders.

use crate::error::{Error, Result};
use crate::findings::{FrameId, Findings};

/// Frame identity, findings sink and nesting depth for one decode pass.
#[derive(Debug)]
pub struct Scope<'a> {
    frame: FrameId,
    findings: &'a mut Findings,
    depth: usize,
    max_depth: usize,
}

impl<'a> Scope<'a> {
    /// Create a top-level scope.
    pub fn new(frame: FrameId, findings: &'a mut Findings, max_depth: usize) -> Self {
        Self {
            frame,
            findings,
            depth: 0,
            max_depth,
        }
    }

    /// Frame being decoded.
    #[must_use]
    pub const fn frame(&self) -> FrameId {
        self.frame
    }

    /// Current nesting depth.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Findings sink.
    pub fn findings(&mut self) -> &mut Findings {
        self.findings
    }

    /// Enter a nested payload, failing once the depth limit is reached.
    pub fn descend(&mut self) -> Result<Scope<'_>> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(Error::DepthExceeded {
                depth,
                limit: self.max_depth,
            });
        }
        Ok(Scope {
            frame: self.frame,
            findings: self.findings,
            depth,
            max_depth: self.max_depth,
        })
    }
}
