pub mod scenario;
pub mod util;

pub use util::{run_dir, split_csv};
