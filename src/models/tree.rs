use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeStatus {
    Viable,
    Dormant,
    Removed,
}

impl TreeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeStatus::Viable => "Viable",
            TreeStatus::Dormant => "Dormant",
            TreeStatus::Removed => "Removed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Viable" => Some(TreeStatus::Viable),
            "Dormant" => Some(TreeStatus::Dormant),
            "Removed" => Some(TreeStatus::Removed),
            _ => None,
        }
    }
}

/// A tracked tree. Only the balance fields are owned by this pipeline;
/// identity and agronomic fields are maintained by whoever registers trees.
#[derive(Debug, Clone)]
pub struct Tree {
    pub id: String,
    pub status: TreeStatus,
    pub trunk_diameter_cm: Option<f64>,
    /// Crop coefficient override; the configured default applies when unset
    pub kc: Option<f64>,
    /// End-of-day balance as of the last advance (mm)
    pub soil_balance: Option<f64>,
    /// Balance frozen at the start of the last processed day (mm)
    pub start_of_day_balance: Option<f64>,
    /// Day-start marker of the date this tree was last advanced for
    pub last_balance_update: Option<DateTime<Utc>>,
    /// Canopy area used in the last advance (m², diagnostic)
    pub calculated_reg_area: Option<f64>,
}

/// Whether a tree's start-of-day anchor is valid for the day being processed.
/// Transitions happen only inside the balance updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorState {
    /// Already advanced for this date; re-runs must reuse the stored anchor
    AnchoredToday,
    /// A new day: the previous end-of-day balance becomes the anchor
    NeedsNewAnchor,
}

impl Tree {
    pub fn anchor_state(&self, processing_date: NaiveDate) -> AnchorState {
        match self.last_balance_update {
            Some(ts) if ts.date_naive() == processing_date => AnchorState::AnchoredToday,
            _ => AnchorState::NeedsNewAnchor,
        }
    }
}
