//! Tri-color status indicator.
//!
//! The machine never picks colors itself; it emits a [`Cue`] at each
//! milestone and [`Cue::color`] projects it onto the LED.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What the LED can show. Yellow is red and green together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Off,
    Red,
    Green,
    Blue,
    Yellow,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
        };
        f.write_str(name)
    }
}

/// Milestones the machine reports to the indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cue {
    /// Machine start, before anything else happens.
    Startup,
    /// Entering `AssociatingRadio`.
    Associating,
    /// The radio association succeeded.
    Associated,
    /// `AwaitingAddress` succeeded.
    AddressAcquired,
    /// `EstablishingTransport` succeeded.
    TransportReady,
    /// A blocking send or receive is about to start.
    IoStarted,
    /// The blocking send or receive returned.
    IoFinished,
    /// One half of the failure blink.
    FailureBlink { lit: bool },
    /// Machine reached `Terminated`.
    Terminated,
}

impl Cue {
    pub fn color(self) -> Color {
        match self {
            Cue::Startup | Cue::Terminated => Color::Off,
            Cue::Associating => Color::Red,
            Cue::Associated => Color::Blue,
            Cue::AddressAcquired => Color::Green,
            Cue::TransportReady => Color::Yellow,
            Cue::IoStarted => Color::Green,
            Cue::IoFinished => Color::Yellow,
            Cue::FailureBlink { lit: true } => Color::Red,
            Cue::FailureBlink { lit: false } => Color::Off,
        }
    }
}

/// Hardware capability with fixed color commands. Implementations must not
/// block.
pub trait StatusIndicator {
    fn show(&mut self, color: Color);

    fn cue(&mut self, cue: Cue) {
        self.show(cue.color());
    }
}

impl<T: StatusIndicator + ?Sized> StatusIndicator for Box<T> {
    fn show(&mut self, color: Color) {
        (**self).show(color)
    }
}

/// Host stand-in for the LED: writes each color change to the log.
#[derive(Debug, Default)]
pub struct LogIndicator {
    current: Option<Color>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Color> {
        self.current
    }
}

impl StatusIndicator for LogIndicator {
    fn show(&mut self, color: Color) {
        if self.current != Some(color) {
            log::debug!("indicator: {color}");
        }
        self.current = Some(color);
    }
}

/// Blink red/off with `half_period` per half. `cycles = None` never returns
/// control to the caller's logic; it loops for as long as the device is
/// powered.
pub fn blink_failure(
    indicator: &mut dyn StatusIndicator,
    half_period: Duration,
    cycles: Option<u32>,
) {
    match cycles {
        Some(n) => {
            for _ in 0..n {
                blink_once(indicator, half_period);
            }
        }
        None => loop {
            blink_once(indicator, half_period);
        },
    }
}

fn blink_once(indicator: &mut dyn StatusIndicator, half_period: Duration) {
    indicator.cue(Cue::FailureBlink { lit: true });
    std::thread::sleep(half_period);
    indicator.cue(Cue::FailureBlink { lit: false });
    std::thread::sleep(half_period);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<Color>);

    impl StatusIndicator for Recorder {
        fn show(&mut self, color: Color) {
            self.0.push(color);
        }
    }

    #[test]
    fn milestones_map_to_colors() {
        assert_eq!(Cue::Associating.color(), Color::Red);
        assert_eq!(Cue::Associated.color(), Color::Blue);
        assert_eq!(Cue::AddressAcquired.color(), Color::Green);
        assert_eq!(Cue::TransportReady.color(), Color::Yellow);
        assert_eq!(Cue::Terminated.color(), Color::Off);
    }

    #[test]
    fn io_alternates_green_yellow() {
        let mut rec = Recorder::default();
        for _ in 0..2 {
            rec.cue(Cue::IoStarted);
            rec.cue(Cue::IoFinished);
        }
        assert_eq!(
            rec.0,
            vec![Color::Green, Color::Yellow, Color::Green, Color::Yellow]
        );
    }

    #[test]
    fn bounded_blink_alternates_red_off() {
        let mut rec = Recorder::default();
        blink_failure(&mut rec, Duration::ZERO, Some(2));
        assert_eq!(rec.0, vec![Color::Red, Color::Off, Color::Red, Color::Off]);
    }

    #[test]
    fn log_indicator_tracks_current() {
        let mut led = LogIndicator::new();
        assert_eq!(led.current(), None);
        led.cue(Cue::Associated);
        assert_eq!(led.current(), Some(Color::Blue));
    }
}
