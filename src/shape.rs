//! Shape descriptor shared by layer input/output contracts.

use serde::{Deserialize, Serialize};

/// Unsigned triple `(W, H, D)`. A plain vector uses `(N, 1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape3(pub u32, pub u32, pub u32);

impl Shape3 {
    pub fn new(w: u32, h: u32, d: u32) -> Self {
        Shape3(w, h, d)
    }

    pub fn vector(n: u32) -> Self {
        Shape3(n, 1, 1)
    }

    pub fn w(&self) -> u32 {
        self.0
    }

    pub fn h(&self) -> u32 {
        self.1
    }

    pub fn d(&self) -> u32 {
        self.2
    }

    /// Total element count, i.e. `W * H * D`.
    pub fn len(&self) -> usize {
        self.0 as usize * self.1 as usize * self.2 as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Shape3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}
