use std::cell::Cell;

use crate::{
    cfg::{Config, Measurements, Targets},
    reading::Reading,
};

/// Read only [View] of an estimator, handed to [Listener]s during estimation.
#[derive(Debug, Clone, Copy)]
pub struct View<'a, const D: usize> {
    pub(crate) readings: &'a [Reading<D>],
    pub(crate) cfg: &'a Config,
    pub(crate) measurements: Measurements,
    pub(crate) targets: Targets,
    pub(crate) min_readings: usize,
    pub(crate) locked: &'a Cell<bool>,
}

impl<const D: usize> View<'_, D> {
    /// Readings being processed
    pub fn readings(&self) -> &[Reading<D>] {
        self.readings
    }

    /// [Config] of the ongoing pass
    pub fn config(&self) -> &Config {
        self.cfg
    }

    /// [Measurements] of the ongoing pass
    pub fn measurements(&self) -> Measurements {
        self.measurements
    }

    /// [Targets] of the ongoing pass
    pub fn targets(&self) -> Targets {
        self.targets
    }

    /// Minimal number of readings of the ongoing pass
    pub fn min_readings(&self) -> usize {
        self.min_readings
    }

    /// Returns true while the estimator is running
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }
}

/// Estimation [Listener]. Notifications are synchronous, on the
/// estimating thread. All methods default to doing nothing.
pub trait Listener<const D: usize> {
    /// Estimation is starting
    fn on_estimate_start(&mut self, _view: &View<'_, D>) {}

    /// One sampling iteration (1 based index) completed
    fn on_estimate_next_iteration(&mut self, _view: &View<'_, D>, _iteration: usize) {}

    /// Progress (in [0, 1]) moved forward
    fn on_estimate_progress_change(&mut self, _view: &View<'_, D>, _progress: f32) {}

    /// Estimation is about to return
    fn on_estimate_end(&mut self, _view: &View<'_, D>) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn view_follows_lock() {
        let cfg = Config::default();
        let locked = Cell::new(false);

        let view = View::<2> {
            readings: &[],
            cfg: &cfg,
            measurements: Measurements::Ranging,
            targets: Targets::position_only(),
            min_readings: 3,
            locked: &locked,
        };

        assert!(!view.is_locked());
        locked.set(true);
        assert!(view.is_locked());
        locked.set(false);
        assert!(!view.is_locked());
    }
}
