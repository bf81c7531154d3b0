/// Hardware abstraction for supported boards.
///
/// Each board module defines identification constants selected at compile
/// time via feature flags. Pin assignments are not needed: the node only
/// drives the radio and the USB serial console.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BOARD_NAME: &str = "xiao_esp32s3";
    pub const CHIP: &str = "ESP32-S3";
}

#[cfg(all(feature = "board-devkit", not(feature = "board-xiao")))]
mod hw {
    pub const BOARD_NAME: &str = "esp32_devkitc";
    pub const CHIP: &str = "ESP32";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-devkit")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
    pub const CHIP: &str = "unknown";
}

pub use hw::*;
