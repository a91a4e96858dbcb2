mod pairing;
mod window;

pub use self::pairing::{Discriminator, PairingCode, PairingCodeError, SetupCode};
pub use self::window::{
    CloseReason, CommissioningWindow, DEFAULT_WINDOW_TIMEOUT, OnStateChange, OnTimeout,
    OpenTrigger, WindowError, WindowState,
};
