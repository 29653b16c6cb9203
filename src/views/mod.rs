// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Role-based views over the wearables core

mod personal;

pub use personal::{DeviceCard, DeviceStatus, PersonalPanel, Vendor};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::RosterPersistence;
use crate::roster::{Athlete, AthleteId};
use crate::zones::Zone;

/// Who is looking at the wearables tab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Coach,
    Athlete,
    Specialist,
}

impl Role {
    /// Case-insensitive parse; anything unrecognised is a coach
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "athlete" => Role::Athlete,
            "specialist" => Role::Specialist,
            _ => Role::Coach,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Coach => "coach",
            Role::Athlete => "athlete",
            Role::Specialist => "specialist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies the current role. Read once when a view is opened.
pub trait RoleSource: Send + Sync {
    fn role(&self) -> Role;
}

/// Always answers the same role
#[derive(Debug, Clone, Copy)]
pub struct FixedRole(pub Role);

impl RoleSource for FixedRole {
    fn role(&self) -> Role {
        self.0
    }
}

static SESSION_ROLE: RwLock<Option<String>> = parking_lot::const_rwlock(None);

/// Store the signed-in user's role for the rest of the process
pub fn set_session_role(value: &str) {
    *SESSION_ROLE.write() = Some(value.to_string());
}

pub fn clear_session_role() {
    *SESSION_ROLE.write() = None;
}

/// Role from process-wide session state, with a fallback when none is set
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionRole {
    fallback: Role,
}

impl SessionRole {
    pub fn new(fallback: Role) -> Self {
        Self { fallback }
    }
}

impl RoleSource for SessionRole {
    fn role(&self) -> Role {
        match SESSION_ROLE.read().as_deref() {
            Some(value) => Role::parse(value),
            None => self.fallback,
        }
    }
}

/// Layout of the coach's roster display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Team,
    Comparison,
}

/// Display projection of one athlete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRow {
    pub id: AthleteId,
    pub name: String,
    pub display_name: String,
    pub current_hr: Option<u16>,
    pub avg_hr: Option<u16>,
    pub pct_of_max: u16,
    pub zone_seconds: [u64; 4],
    pub connected: bool,
}

impl TeamRow {
    pub fn from_athlete(athlete: &Athlete, default_max_hr: u16) -> Self {
        let mut display_name = athlete.name.clone();
        if let Some(nick) = athlete.nickname.as_deref().filter(|n| !n.is_empty()) {
            display_name.push_str(&format!(" ({})", nick));
        }
        if let Some(sensor) = athlete.sensor_id.as_deref().filter(|s| !s.is_empty()) {
            display_name.push_str(&format!(" [{}]", sensor));
        }

        let hr = athlete.current_hr.unwrap_or(0);
        let max = athlete.max_hr.filter(|m| *m > 0).unwrap_or(default_max_hr).max(1);
        let pct_of_max = (f64::from(hr) / f64::from(max) * 100.0).round() as u16;

        let mut zone_seconds = [0; 4];
        for zone in Zone::ALL {
            zone_seconds[zone.index()] = athlete.time_in_zones.get(zone);
        }

        Self {
            id: athlete.id.clone(),
            name: athlete.name.clone(),
            display_name,
            current_hr: athlete.current_hr,
            avg_hr: athlete.avg_hr,
            pct_of_max,
            zone_seconds,
            connected: athlete.connected,
        }
    }

    /// One text line in the given layout. Comparison has no content yet.
    pub fn render(&self, mode: ViewMode) -> Option<String> {
        let hr = bpm_or_dashes(self.current_hr);
        let avg = bpm_or_dashes(self.avg_hr);
        match mode {
            ViewMode::List => {
                let zones = Zone::ALL
                    .iter()
                    .map(|z| format!("{} {}s", z, self.zone_seconds[z.index()]))
                    .collect::<Vec<_>>()
                    .join(" ");
                let link = if self.connected { "Connected" } else { "Not connected" };
                Some(format!(
                    "{} [{}] | {} bpm | avg {} bpm | {}% | {}",
                    self.display_name, link, hr, avg, self.pct_of_max, zones
                ))
            }
            ViewMode::Team => {
                let dot = if self.connected { "+" } else { "-" };
                Some(format!("{} {} | {} bpm | Avg {}", self.name, dot, hr, avg))
            }
            ViewMode::Comparison => None,
        }
    }
}

fn bpm_or_dashes(value: Option<u16>) -> String {
    match value {
        Some(bpm) if bpm > 0 => bpm.to_string(),
        _ => "--".to_string(),
    }
}

/// Read-only roster for specialists, straight from the persisted snapshot
pub fn specialist_rows(persistence: &RosterPersistence, default_max_hr: u16) -> Vec<TeamRow> {
    persistence
        .load()
        .into_iter()
        .map(|mut athlete| {
            athlete.connected = false;
            TeamRow::from_athlete(&athlete, default_max_hr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::roster::TimeInZones;
    use crate::zones::ZoneBoundaries;
    use std::sync::Arc;

    fn athlete() -> Athlete {
        Athlete {
            id: AthleteId::from("p_1"),
            name: "Alice".to_string(),
            nickname: Some("Al".to_string()),
            sensor_id: Some("H10".to_string()),
            connected: true,
            current_hr: Some(95),
            avg_hr: Some(90),
            max_hr: None,
            zone_boundaries: ZoneBoundaries::default(),
            time_in_zones: TimeInZones { z1: 4, z2: 1, z3: 0, z4: 0 },
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Athlete"), Role::Athlete);
        assert_eq!(Role::parse("SPECIALIST"), Role::Specialist);
        assert_eq!(Role::parse("coach"), Role::Coach);
        assert_eq!(Role::parse("admin"), Role::Coach);
        assert_eq!(Role::parse(""), Role::Coach);
    }

    #[test]
    fn test_session_role() {
        let source = SessionRole::new(Role::Specialist);
        clear_session_role();
        assert_eq!(source.role(), Role::Specialist);

        set_session_role("ATHLETE");
        assert_eq!(source.role(), Role::Athlete);

        set_session_role("referee");
        assert_eq!(source.role(), Role::Coach);
        clear_session_role();
    }

    #[test]
    fn test_team_row_projection() {
        let row = TeamRow::from_athlete(&athlete(), 190);
        assert_eq!(row.display_name, "Alice (Al) [H10]");
        assert_eq!(row.pct_of_max, 50);
        assert_eq!(row.zone_seconds, [4, 1, 0, 0]);
        assert!(row.connected);
    }

    #[test]
    fn test_team_row_without_sample() {
        let mut a = athlete();
        a.current_hr = None;
        a.avg_hr = None;
        a.max_hr = Some(200);
        let row = TeamRow::from_athlete(&a, 190);
        assert_eq!(row.pct_of_max, 0);
        assert_eq!(
            row.render(ViewMode::List).unwrap(),
            "Alice (Al) [H10] [Connected] | -- bpm | avg -- bpm | 0% | Z1 4s Z2 1s Z3 0s Z4 0s"
        );
        assert_eq!(row.render(ViewMode::Team).unwrap(), "Alice + | -- bpm | Avg --");
        assert_eq!(row.render(ViewMode::Comparison), None);
    }

    #[test]
    fn test_specialist_rows_are_read_only_snapshot() {
        let persistence = RosterPersistence::new(Arc::new(MemoryStore::new()), "players");
        persistence.save(&[athlete()]).unwrap();

        let rows = specialist_rows(&persistence, 190);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].connected);
        assert_eq!(rows[0].current_hr, Some(95));
    }
}
