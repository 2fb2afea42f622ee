/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use relm4::abstractions::Toaster;
use relm4::adw;
use relm4::gtk;
use relm4::gtk::pango;

#[derive(Debug, Clone, Copy)]
enum Severity {
    Error,
    Info,
}

impl Severity {
    /// Icon, icon color, timeout in seconds (0 stays until dismissed) and
    /// priority.
    fn style(self) -> (&'static str, &'static str, u32, adw::ToastPriority) {
        match self {
            Self::Error => ("✖", "red", 0, adw::ToastPriority::High),
            Self::Info => ("✓", "lime", 2, adw::ToastPriority::Normal),
        }
    }
}

/// Popup notifications for action results.
#[derive(Default)]
pub struct Notifier {
    toaster: Toaster,
}

impl Notifier {
    fn label(msg: &str, icon: &str, color: &str) -> gtk::Label {
        gtk::Label::builder()
            .wrap(true)
            .wrap_mode(pango::WrapMode::WordChar)
            .max_width_chars(50)
            .halign(gtk::Align::Center)
            .justify(gtk::Justification::Center)
            .use_markup(true)
            .label(format!(
                "<span foreground='{color}' font='16'><b>{icon}</b></span> <b>{}</b>",
                gtk::glib::markup_escape_text(msg)
            ))
            .build()
    }

    fn notify(&self, msg: &str, severity: Severity) {
        let (icon, color, timeout, priority) = severity.style();
        let toast = adw::Toast::builder()
            .custom_title(&Self::label(msg, icon, color))
            .timeout(timeout)
            .priority(priority)
            .build();

        self.toaster.add_toast(toast);
    }

    pub fn error(&self, msg: &str) {
        self.notify(msg, Severity::Error);
    }

    pub fn info(&self, msg: &str) {
        self.notify(msg, Severity::Info);
    }

    pub fn overlay_widget(&self) -> &adw::ToastOverlay {
        self.toaster.overlay_widget()
    }
}
