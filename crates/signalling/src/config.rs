pub const MAP_WIDTH: usize = 256;
pub const MAP_HEIGHT: usize = 256;
