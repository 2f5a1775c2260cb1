// Workbook I/O: grid reading, copy export, in-place patching

pub mod output;
pub mod patch;
pub mod xlsx;

pub use output::{copy_path, persist, timestamped_path, OutputMode, PersistReport};
pub use patch::{patch_cells, PatchResult};
pub use xlsx::{read_grid, write_grid, XlsxSource};
