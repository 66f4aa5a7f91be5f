// The turtle: a scoped cursor whose height encodes pitch.
//
// The turtle carries seven axes: X/Y/Z position, yaw (heading in degrees),
// the angle step used by turns, hue (a visible-light wavelength in nm) and
// line thickness. All seven live in one `TurtleState` value. Branching in the
// grammar (`[` / `]`) saves and restores whole snapshots on a scope stack, so
// the axes can never drift out of step with each other.
//
// Heading convention: 0° faces forward (time runs on, notes sound), 90° faces
// up, 180° backward, 270° down. Up/down headings move the Y axis, which the
// composer reads as a MIDI pitch.

use serde::{Deserialize, Serialize};

/// Lower edge of the hue range (violet), in nanometres.
pub const HUE_MIN: i32 = 380;
/// Upper edge of the hue range (red), in nanometres.
pub const HUE_MAX: i32 = 750;

/// Snapshot of every turtle axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurtleState {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Heading in degrees, always within `[0, 360)`.
    pub yaw: i32,
    /// Degrees added or removed by one turn.
    pub angle: i32,
    /// Wavelength in nm, always within `[HUE_MIN, HUE_MAX]`.
    pub hue: i32,
    pub thickness: i32,
}

impl Default for TurtleState {
    fn default() -> Self {
        TurtleState {
            x: 0,
            y: 0,
            z: 0,
            yaw: 0,
            angle: 90,
            hue: 565,
            thickness: 50,
        }
    }
}

/// Heading classes the composer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Up,
    Backward,
    Down,
    /// Any heading that is not a multiple of 90°.
    Oblique,
}

impl Direction {
    pub fn from_yaw(yaw: i32) -> Direction {
        match yaw.rem_euclid(360) {
            0 => Direction::Forward,
            90 => Direction::Up,
            180 => Direction::Backward,
            270 => Direction::Down,
            _ => Direction::Oblique,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Forward | Direction::Backward)
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// Reflect a wavelength back into `[HUE_MIN, HUE_MAX]`, bouncing off the
/// edges as many times as the overshoot requires.
pub fn reflect_hue(hue: i32) -> i32 {
    let span = HUE_MAX - HUE_MIN;
    let offset = wrap_hue_offset(i64::from(hue));
    if offset <= span {
        HUE_MIN + offset
    } else {
        HUE_MAX - (offset - span)
    }
}

/// Offset from `HUE_MIN` modulo one reflection period (up and back down).
fn wrap_hue_offset(hue: i64) -> i32 {
    let period = 2 * i64::from(HUE_MAX - HUE_MIN);
    (hue - i64::from(HUE_MIN)).rem_euclid(period) as i32
}

#[derive(Debug, Clone)]
pub struct Turtle {
    /// Scope stack; the last entry is the live state. Never empty.
    scopes: Vec<TurtleState>,
    /// Starting state used by `reset`.
    origin: TurtleState,
    /// Amount one hue symbol shifts the hue.
    hue_step: i32,
}

impl Default for Turtle {
    fn default() -> Self {
        Turtle::new(TurtleState::default(), 10)
    }
}

impl Turtle {
    pub fn new(origin: TurtleState, hue_step: i32) -> Self {
        let origin = TurtleState {
            yaw: origin.yaw.rem_euclid(360),
            hue: reflect_hue(origin.hue),
            ..origin
        };
        Turtle {
            scopes: vec![origin],
            origin,
            hue_step,
        }
    }

    /// Turtle starting from the default state with a custom angle step.
    pub fn with_angle(angle: i32) -> Self {
        Turtle::new(
            TurtleState {
                angle,
                ..TurtleState::default()
            },
            10,
        )
    }

    /// Drop every scope and return to the starting state.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.scopes.push(self.origin);
    }

    pub fn state(&self) -> &TurtleState {
        // `scopes` always holds the root state.
        &self.scopes[self.scopes.len() - 1]
    }

    fn state_mut(&mut self) -> &mut TurtleState {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    /// Number of scopes, including the root.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn x(&self) -> i32 {
        self.state().x
    }

    pub fn y(&self) -> i32 {
        self.state().y
    }

    pub fn z(&self) -> i32 {
        self.state().z
    }

    pub fn yaw(&self) -> i32 {
        self.state().yaw
    }

    pub fn angle(&self) -> i32 {
        self.state().angle
    }

    pub fn hue(&self) -> i32 {
        self.state().hue
    }

    pub fn thickness(&self) -> i32 {
        self.state().thickness
    }

    pub fn hue_step(&self) -> i32 {
        self.hue_step
    }

    pub fn direction(&self) -> Direction {
        Direction::from_yaw(self.yaw())
    }

    pub fn set_x(&mut self, x: i32) {
        self.state_mut().x = x;
    }

    pub fn set_y(&mut self, y: i32) {
        self.state_mut().y = y;
    }

    pub fn set_z(&mut self, z: i32) {
        self.state_mut().z = z;
    }

    /// Set the heading, normalised into `[0, 360)`.
    pub fn set_yaw(&mut self, yaw: i32) {
        self.state_mut().yaw = yaw.rem_euclid(360);
    }

    pub fn set_angle(&mut self, angle: i32) {
        self.state_mut().angle = angle;
    }

    /// Set the hue, reflected into the visible range.
    pub fn set_hue(&mut self, hue: i32) {
        self.state_mut().hue = reflect_hue(hue);
    }

    pub fn set_thickness(&mut self, thickness: i32) {
        self.state_mut().thickness = thickness;
    }

    /// Turn by `steps` angle increments (negative turns the other way).
    pub fn turn(&mut self, steps: i32) {
        let yaw = i64::from(self.yaw()) + i64::from(steps) * i64::from(self.angle());
        self.set_yaw(yaw.rem_euclid(360) as i32);
    }

    /// Shift the hue by `steps` hue increments.
    pub fn shift_hue(&mut self, steps: i32) {
        let hue = i64::from(self.hue()) + i64::from(steps) * i64::from(self.hue_step);
        self.set_hue(HUE_MIN + wrap_hue_offset(hue));
    }

    /// Move along X in the direction the turtle faces; vertical and oblique
    /// headings leave X alone.
    pub fn advance(&mut self, distance: i32) {
        match self.direction() {
            Direction::Forward => self.set_x(self.x() + distance),
            Direction::Backward => self.set_x(self.x() - distance),
            _ => {}
        }
    }

    /// Open a scope: the live state is duplicated on top of the stack.
    pub fn save_state(&mut self) {
        let current = *self.state();
        self.scopes.push(current);
    }

    /// Close the innermost scope and return its final state. The root scope
    /// is never popped; closing it returns `None` and changes nothing.
    pub fn restore_state(&mut self) -> Option<TurtleState> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_restore_is_identity() {
        let mut turtle = Turtle::with_angle(45);
        turtle.set_y(60);
        turtle.turn(1);
        let before = *turtle.state();
        let depth = turtle.depth();

        turtle.save_state();
        assert_eq!(turtle.depth(), depth + 1);
        assert_eq!(*turtle.state(), before);
        turtle.restore_state();

        assert_eq!(*turtle.state(), before);
        assert_eq!(turtle.depth(), depth);
    }

    #[test]
    fn restore_discards_changes_made_in_scope() {
        let mut turtle = Turtle::default();
        turtle.set_y(48);
        turtle.save_state();
        turtle.set_y(72);
        turtle.turn(1);
        turtle.shift_hue(3);
        let inner = turtle.restore_state().unwrap();
        assert_eq!(inner.y, 72);
        assert_eq!(turtle.y(), 48);
        assert_eq!(turtle.yaw(), 0);
        assert_eq!(turtle.hue(), TurtleState::default().hue);
    }

    #[test]
    fn restoring_root_scope_is_a_no_op() {
        let mut turtle = Turtle::default();
        turtle.set_x(5);
        assert_eq!(turtle.restore_state(), None);
        assert_eq!(turtle.depth(), 1);
        assert_eq!(turtle.x(), 5);
    }

    #[test]
    fn yaw_is_normalised() {
        let mut turtle = Turtle::default();
        turtle.set_yaw(-90);
        assert_eq!(turtle.yaw(), 270);
        assert_eq!(turtle.direction(), Direction::Down);
        turtle.set_yaw(450);
        assert_eq!(turtle.yaw(), 90);
        assert_eq!(turtle.direction(), Direction::Up);
    }

    #[test]
    fn direction_classes() {
        assert_eq!(Direction::from_yaw(0), Direction::Forward);
        assert_eq!(Direction::from_yaw(180), Direction::Backward);
        assert_eq!(Direction::from_yaw(-180), Direction::Backward);
        assert_eq!(Direction::from_yaw(45), Direction::Oblique);
        assert!(Direction::Backward.is_horizontal());
        assert!(Direction::Down.is_vertical());
        assert!(!Direction::Oblique.is_horizontal());
        assert!(!Direction::Oblique.is_vertical());
    }

    #[test]
    fn hue_reflects_at_both_edges() {
        assert_eq!(reflect_hue(500), 500);
        assert_eq!(reflect_hue(760), 740);
        assert_eq!(reflect_hue(370), 390);
        assert_eq!(reflect_hue(HUE_MAX), HUE_MAX);
        assert_eq!(reflect_hue(HUE_MIN), HUE_MIN);
        // Bounces off the top, then the bottom.
        assert_eq!(reflect_hue(750 + 370 + 10), 390);
    }

    #[test]
    fn hue_steps_bounce_back_into_range() {
        let mut turtle = Turtle::new(
            TurtleState {
                hue: 745,
                ..TurtleState::default()
            },
            10,
        );
        turtle.shift_hue(1);
        assert_eq!(turtle.hue(), 745);
        turtle.shift_hue(-1);
        assert_eq!(turtle.hue(), 735);
    }

    #[test]
    fn turns_use_angle_step() {
        let mut turtle = Turtle::with_angle(90);
        turtle.turn(1);
        assert_eq!(turtle.direction(), Direction::Up);
        turtle.turn(-2);
        assert_eq!(turtle.direction(), Direction::Down);
        turtle.set_angle(30);
        turtle.turn(1);
        assert_eq!(turtle.yaw(), 300);
        assert_eq!(turtle.direction(), Direction::Oblique);
    }

    #[test]
    fn advance_follows_heading() {
        let mut turtle = Turtle::default();
        turtle.advance(2);
        assert_eq!(turtle.x(), 2);
        turtle.turn(2);
        turtle.advance(1);
        assert_eq!(turtle.x(), 1);
        turtle.turn(1);
        turtle.advance(1);
        assert_eq!(turtle.x(), 1);
    }

    #[test]
    fn reset_returns_to_origin() {
        let mut turtle = Turtle::with_angle(60);
        turtle.save_state();
        turtle.set_y(99);
        turtle.set_z(3);
        turtle.set_thickness(10);
        turtle.reset();
        assert_eq!(turtle.depth(), 1);
        assert_eq!(turtle.y(), 0);
        assert_eq!(turtle.z(), 0);
        assert_eq!(turtle.thickness(), 50);
        assert_eq!(turtle.angle(), 60);
    }

    #[test]
    fn extreme_steps_stay_in_range() {
        let origin = TurtleState {
            angle: i32::MAX,
            ..TurtleState::default()
        };
        let mut turtle = Turtle::new(origin, i32::MAX);
        turtle.turn(1);
        assert_eq!(turtle.yaw(), 127);
        turtle.turn(-1);
        assert_eq!(turtle.yaw(), 0);
        for steps in [1, -1, i32::MAX, i32::MIN] {
            turtle.shift_hue(steps);
            assert!((HUE_MIN..=HUE_MAX).contains(&turtle.hue()));
        }
        assert!((HUE_MIN..=HUE_MAX).contains(&reflect_hue(i32::MIN)));
        assert!((HUE_MIN..=HUE_MAX).contains(&reflect_hue(i32::MAX)));
    }
}
