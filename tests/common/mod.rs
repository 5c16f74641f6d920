pub mod fake_transport;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Route tracing output through the test writer so `--nocapture` shows it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
