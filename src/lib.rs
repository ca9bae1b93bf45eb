use lazy_static::lazy_static;
use plate_format::PlateFormats;

pub mod axis;
pub mod csv_io;
pub mod efficiency;
pub mod error;
pub mod grid;
pub mod key_table;
pub mod layout;
pub mod measurements;
pub mod melt;
pub mod normalize;
pub mod plate_format;
pub mod render_plate;
pub mod table;

lazy_static! {
    // Standard plate geometries (96, 384, 1536 in both row-naming
    // conventions)
    pub static ref PLATE_FORMATS: PlateFormats = PlateFormats::default();
}
