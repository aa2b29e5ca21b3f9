mod volume_header;

pub use self::volume_header::*;
