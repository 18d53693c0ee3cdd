use chrono::{DateTime, TimeDelta, Utc};
use model::{core::window::FetchWindow, errors::WindowError};
use std::time::Duration;

/// The window actually requested from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveWindow {
    pub window: FetchWindow,
    /// Set when the end was pulled back; holds the requested end.
    pub clamped_from: Option<DateTime<Utc>>,
}

/// Pulls `window.end` back to `now - margin` when it is later than that.
///
/// The provider rejects windows ending too close to the present. Clamping an
/// already clamped window with the same `now` changes nothing. A window that
/// starts after the clamp limit cannot be requested at all.
pub fn clamp_window(
    window: &FetchWindow,
    now: DateTime<Utc>,
    margin: Duration,
) -> Result<EffectiveWindow, WindowError> {
    let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
    let limit = now.checked_sub_signed(margin).unwrap_or(DateTime::<Utc>::MIN_UTC);

    if window.end <= limit {
        return Ok(EffectiveWindow {
            window: window.clone(),
            clamped_from: None,
        });
    }

    let clamped = FetchWindow::new(window.scope.clone(), window.start, limit)?;
    Ok(EffectiveWindow {
        window: clamped,
        clamped_from: Some(window.end),
    })
}
