//! Personal travel calendar defaults.

use emporio_server::{HandlerContext, HandlerResult};
use serde::Serialize;

const SPECIAL_DAYS: &[(&str, &str)] = &[
    ("MY_BIRTHDAY", "My Birthday"),
    ("MY_ANNIVERSARY", "My Anniversary"),
    ("SPOUSE_BIRTHDAY", "Spouse's Birthday"),
    ("MOTHER_BIRTHDAY", "Mother's Birthday"),
    ("FATHER_BIRTHDAY", "Father's Birthday"),
    ("CHILD_BIRTHDAY", "Child's Birthday"),
];

const HOLIDAY_PERIODS: &[(&str, &str)] = &[
    ("MY_WORK_BREAK", "My Work Break"),
    ("SPOUSE_WORK_BREAK", "Spouse's Work Break"),
    ("CHILD_VACATION", "Child's Vacation Period"),
    ("PARENT_AVAILABILITY", "Parent's Availability"),
];

/// One special day.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialDay {
    /// Stable key.
    pub ocassion: &'static str,
    /// Display label.
    pub render_text: &'static str,
}

/// `GET /v1/personal-travel-calendar/default-ocassions` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultOcassions {
    /// Every selectable special day.
    pub available_ocassions: Vec<SpecialDay>,
}

/// One kind of holiday break.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayPeriod {
    /// Stable key.
    pub break_type: &'static str,
    /// Display label.
    pub render_text: &'static str,
}

/// `GET /v1/personal-travel-calendar/default-breaks` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultBreaks {
    /// Every selectable break kind.
    pub available_breaks: Vec<HolidayPeriod>,
}

/// Lists the default special days.
pub async fn default_ocassions(_ctx: HandlerContext) -> HandlerResult<DefaultOcassions> {
    Ok(DefaultOcassions {
        available_ocassions: SPECIAL_DAYS
            .iter()
            .map(|&(ocassion, render_text)| SpecialDay {
                ocassion,
                render_text,
            })
            .collect(),
    })
}

/// Lists the default break kinds.
pub async fn default_breaks(_ctx: HandlerContext) -> HandlerResult<DefaultBreaks> {
    Ok(DefaultBreaks {
        available_breaks: HOLIDAY_PERIODS
            .iter()
            .map(|&(break_type, render_text)| HolidayPeriod {
                break_type,
                render_text,
            })
            .collect(),
    })
}
