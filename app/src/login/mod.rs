//! Ways of getting the authorization code back from the browser.

mod counter;
mod listener;
mod manual;

use std::time::Duration;

use domain::service::AuthorizationCodeReceiver;

pub use self::listener::{CallbackListener, CALLBACK_PATH};
pub use self::manual::ManualCodeEntry;

/// The local redirect listener with a countdown when `interactive`, otherwise
/// a prompt for pasting the code on stdin.
pub fn code_receiver(
    interactive: bool,
    port: u16,
    timeout: Duration,
) -> Box<dyn AuthorizationCodeReceiver> {
    if interactive {
        Box::new(CallbackListener::new(port, timeout))
    } else {
        Box::new(ManualCodeEntry::stdin(timeout))
    }
}
