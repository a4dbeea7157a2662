pub mod colored;
pub mod dimensions;
pub mod frame;
pub mod palette;

pub use colored::{ColoredFrame, DmdFrame, FrameFormat};
pub use dimensions::Dimensions;
pub use frame::{bit_length, byte_length, BitDepth, Frame};
pub use palette::Color;
