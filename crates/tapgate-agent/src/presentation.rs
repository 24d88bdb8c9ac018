//! Log-backed presentation sink.
//!
//! Hardware builds plug a display/LED driver in here; the stock agent
//! surfaces the same state changes through tracing.

use tracing::info;

use tapgate_core::session::Presentation;

pub struct LogPresentation;

impl Presentation for LogPresentation {
    fn set_api_connected(&self, connected: bool) {
        info!(connected, "api connection state");
    }

    fn set_device_name(&self, name: &str) {
        info!(name = %name, "device name");
    }

    fn set_tap_enabled(&self, enabled: bool) {
        info!(enabled, "tap prompt state");
    }

    fn set_tap_prompt(&self, prompt: &str) {
        info!(prompt = %prompt, "tap prompt text");
    }

    fn show_text(&self, line_one: &str, line_two: &str) {
        info!(line_one = %line_one, line_two = %line_two, "display text");
    }

    fn hide_text(&self) {
        info!("display text cleared");
    }

    fn show_success(&self, message: &str, duration_ms: u64) {
        info!(message = %message, duration_ms, "display success");
    }

    fn show_error(&self, message: &str, duration_ms: u64) {
        info!(message = %message, duration_ms, "display error");
    }
}
