//! Display state consumed by the OLED driver.
//!
//! Pixels are out of scope: the core publishes a page selector plus live
//! fields, and a redraw is edge-triggered through `to_be_updated`. Transient
//! pages (alerts, trip conclusions) revert automatically after a few seconds.

use bevy_ecs::prelude::Resource;

/// How long transient pages stay up before reverting.
pub const TRANSIENT_PAGE_MS: u64 = 4_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayPage {
    #[default]
    QrScan,
    Welcome,
    LowBatteryAlert,
    BoundaryCrossAlert,
    PleaseWait,
    IncorrectQrScan,
    GenericAlert,
    TripConclusion,
    TripConclusionFailed,
}

impl DisplayPage {
    /// Alert-class pages revert to `Welcome`.
    pub fn is_alert(self) -> bool {
        matches!(
            self,
            DisplayPage::LowBatteryAlert
                | DisplayPage::BoundaryCrossAlert
                | DisplayPage::IncorrectQrScan
                | DisplayPage::GenericAlert
        )
    }

    /// Pages that auto-revert after [TRANSIENT_PAGE_MS].
    pub fn is_transient(self) -> bool {
        self.is_alert()
            || matches!(
                self,
                DisplayPage::TripConclusion | DisplayPage::TripConclusionFailed
            )
    }

    /// Where a transient page goes when its time is up. Conclusions return
    /// to the scan screen; alerts return to the ride screen.
    pub fn revert_target(self) -> DisplayPage {
        match self {
            DisplayPage::TripConclusion | DisplayPage::TripConclusionFailed => DisplayPage::QrScan,
            _ => DisplayPage::Welcome,
        }
    }
}

/// Display driver seam; a redraw receives the page and the live fields.
pub trait Display: Send + Sync {
    fn draw(&mut self, page: DisplayPage, speed_kmh: f32, battery_percent: i32);
}

#[derive(Resource)]
pub struct DisplayDevice(pub Box<dyn Display>);

/// Page selector plus live fields, owned by the orchestrator.
#[derive(Debug, Resource)]
pub struct UiState {
    pub page: DisplayPage,
    pub prev_page: DisplayPage,
    pub to_be_updated: bool,
    pub speed_kmh: f32,
    pub battery_percent: i32,
    /// Tick time the current transient page went up; `None` on stable pages.
    pub transient_since_ms: Option<u64>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            page: DisplayPage::QrScan,
            prev_page: DisplayPage::QrScan,
            to_be_updated: true,
            speed_kmh: 0.0,
            battery_percent: 100,
            transient_since_ms: None,
        }
    }
}

impl UiState {
    /// Switch pages; idempotent, redraw fires only on a real change.
    pub fn set_page(&mut self, page: DisplayPage) {
        if page == self.page {
            return;
        }
        self.prev_page = self.page;
        self.page = page;
        self.to_be_updated = true;
        self.transient_since_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_classes() {
        assert!(DisplayPage::GenericAlert.is_alert());
        assert!(DisplayPage::IncorrectQrScan.is_alert());
        assert!(!DisplayPage::Welcome.is_alert());
        assert!(DisplayPage::TripConclusion.is_transient());
        assert!(!DisplayPage::TripConclusion.is_alert());
        assert_eq!(DisplayPage::GenericAlert.revert_target(), DisplayPage::Welcome);
        assert_eq!(DisplayPage::TripConclusion.revert_target(), DisplayPage::QrScan);
    }

    #[test]
    fn set_page_is_edge_triggered() {
        let mut ui = UiState::default();
        ui.to_be_updated = false;

        ui.set_page(DisplayPage::QrScan);
        assert!(!ui.to_be_updated, "same page, no redraw");

        ui.set_page(DisplayPage::Welcome);
        assert!(ui.to_be_updated);
        assert_eq!(ui.prev_page, DisplayPage::QrScan);
    }
}
