//! BMP file format interface (§6.2). The codec itself is out of scope
//! (§1); this trait is the seam a BMP-backed loader plugs into without the
//! core depending on a bitmap parser.

use crate::error::Result;
use crate::shape::Shape3;

/// Reads one image, returning its shape and flattened, row-major pixel
/// data. Implementations are responsible for the BMP header (54-byte
/// `BITMAPFILEHEADER` + `BITMAPINFOHEADER`), row-stride padding to a
/// multiple of 4 bytes, and the bottom-to-top row order the format uses.
pub trait BitmapSource {
    fn read_bitmap(&mut self) -> Result<(Shape3, Vec<f32>)>;
}
