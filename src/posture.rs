//! Body-state lifecycle: standing, crouching and jumping.
//!
//! Driven by the tracked height of the user's head. Small height changes
//! crouch or extend the legs; a fast upward excursion is a jump, which
//! lifts the whole rig off the ground instead of stretching it. The state
//! machine is pure (explicit clock, no skeleton access) and hands its
//! decision back as a [`HeightAction`] for the rig to apply.

/// Height changes smaller than this are sensor noise and ignored.
pub const HEIGHT_DEADBAND: f32 = 0.001;

/// Upward speed, in units per second, that distinguishes a jump from
/// standing up quickly.
pub const JUMP_RATE_THRESHOLD: f32 = 1.0;

/// Seconds the head must stay back at baseline before a jump ends.
pub const JUMP_EXIT_DELAY: f64 = 0.3;

/// Seconds after which a jump ends no matter what the tracker reports.
pub const JUMP_TIMEOUT: f64 = 0.5;

/// Shortest allowed hip-to-foot distance when crouching.
pub const MIN_LEG_LENGTH: f32 = 0.1;

/// Sentinel leg length meaning "fully standing"; longer than any rig's
/// legs, so applying it straightens them.
pub const STANDING_LEG_LENGTH: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stance {
    Standing,
    Crouched,
    Jumping,
}

/// What the rig should do with the latest height sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeightAction {
    None,
    /// Re-solve both legs so the hip-to-foot distance drops by `delta`
    /// below standing.
    Adjust { delta: f32 },
    /// Jump started: lift the root by `offset`.
    EnterJump { offset: f32 },
    /// Jump in progress: keep the root lifted by `offset`.
    HoldJump { offset: f32 },
    /// Jump over: drop the root and stand back up.
    ExitJump,
}

#[derive(Debug, Clone)]
pub struct Posture {
    stance: Stance,
    /// Target hip-to-foot distance, world units.
    leg_length: f32,
    /// Current root lift while jumping.
    root_offset: f32,
    /// Head height of the avatar standing at rest.
    standing_head_height: f32,
    /// Running maximum of tracked heights seen outside jumps; tall users
    /// raise the jump baseline instead of triggering it.
    max_user_height: f32,
    last_sample: Option<(f64, f32)>,
    jump_started: f64,
    below_since: Option<f64>,
}

impl Default for Posture {
    fn default() -> Self {
        Self::new()
    }
}

impl Posture {
    pub fn new() -> Self {
        Self {
            stance: Stance::Standing,
            leg_length: STANDING_LEG_LENGTH,
            root_offset: 0.0,
            standing_head_height: 0.0,
            max_user_height: 0.0,
            last_sample: None,
            jump_started: 0.0,
            below_since: None,
        }
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    pub fn leg_length(&self) -> f32 {
        self.leg_length
    }

    pub fn root_offset(&self) -> f32 {
        self.root_offset
    }

    pub fn standing_head_height(&self) -> f32 {
        self.standing_head_height
    }

    /// Record the rest head height tracking is measured against. Called on
    /// load and again whenever the avatar is resized.
    pub fn set_standing_height(&mut self, height: f32) {
        self.standing_head_height = height;
        self.max_user_height = 0.0;
    }

    fn baseline(&self) -> f32 {
        self.standing_head_height.max(self.max_user_height)
    }

    /// Pull the sentinel length down to the rig's real leg length so
    /// relative crouch steps start from a meaningful value.
    pub fn clamp_leg_length(&mut self, max: f32) {
        if max > 0.0 && self.leg_length > max {
            self.leg_length = max;
        }
    }

    /// Shorten the legs by `amount`, clamped to the crouch floor.
    pub fn crouch(&mut self, amount: f32) -> f32 {
        self.leg_length = (self.leg_length - amount).max(MIN_LEG_LENGTH);
        self.stance = Stance::Crouched;
        self.leg_length
    }

    /// Extend the legs by `amount`, saturating at fully standing.
    pub fn rise(&mut self, amount: f32) -> f32 {
        self.leg_length = (self.leg_length + amount).min(STANDING_LEG_LENGTH);
        if self.leg_length >= STANDING_LEG_LENGTH {
            self.stance = Stance::Standing;
        }
        self.leg_length
    }

    pub fn stand_up(&mut self) -> f32 {
        self.leg_length = STANDING_LEG_LENGTH;
        self.stance = Stance::Standing;
        self.root_offset = 0.0;
        self.leg_length
    }

    /// Feed one tracked head-height sample, `now` in seconds.
    pub fn track_height(&mut self, height: f32, now: f64) -> HeightAction {
        if self.standing_head_height <= 0.0 {
            // First sample calibrates the baseline.
            self.standing_head_height = height;
            self.last_sample = Some((now, height));
            return HeightAction::None;
        }

        let Some((last_time, last_height)) = self.last_sample.replace((now, height)) else {
            return HeightAction::None;
        };

        if self.stance == Stance::Jumping {
            return self.track_jump(height, now);
        }

        if (height - last_height).abs() <= HEIGHT_DEADBAND {
            return HeightAction::None;
        }

        let dt = (now - last_time).max(f64::EPSILON);
        let rate = f64::from(height - last_height) / dt;
        if rate > f64::from(JUMP_RATE_THRESHOLD) && height > self.baseline() {
            self.stance = Stance::Jumping;
            self.jump_started = now;
            self.below_since = None;
            self.root_offset = height - self.standing_head_height;
            log::debug!("jump started, offset {:.3}", self.root_offset);
            return HeightAction::EnterJump {
                offset: self.root_offset,
            };
        }

        self.max_user_height = self.max_user_height.max(height);
        let delta = (self.standing_head_height - height).max(0.0);
        self.stance = if delta > HEIGHT_DEADBAND {
            Stance::Crouched
        } else {
            Stance::Standing
        };
        HeightAction::Adjust { delta }
    }

    fn track_jump(&mut self, height: f32, now: f64) -> HeightAction {
        if now - self.jump_started >= JUMP_TIMEOUT {
            log::debug!("jump timed out");
            return self.exit_jump();
        }

        if height <= self.baseline() + HEIGHT_DEADBAND {
            let since = *self.below_since.get_or_insert(now);
            if now - since >= JUMP_EXIT_DELAY {
                return self.exit_jump();
            }
        } else {
            self.below_since = None;
            self.root_offset = height - self.standing_head_height;
        }

        HeightAction::HoldJump {
            offset: self.root_offset.max(0.0),
        }
    }

    fn exit_jump(&mut self) -> HeightAction {
        self.stance = Stance::Standing;
        self.root_offset = 0.0;
        self.below_since = None;
        HeightAction::ExitJump
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing_posture() -> Posture {
        let mut p = Posture::new();
        p.set_standing_height(1.7);
        p.track_height(1.7, 0.0);
        p
    }

    #[test]
    fn deadband_swallows_noise() {
        let mut p = standing_posture();
        assert_eq!(p.track_height(1.7005, 0.1), HeightAction::None);
        assert_eq!(p.track_height(1.7, 0.2), HeightAction::None);
        assert_eq!(p.stance(), Stance::Standing);
    }

    #[test]
    fn lower_head_crouches_by_the_difference() {
        let mut p = standing_posture();
        match p.track_height(1.5, 0.1) {
            HeightAction::Adjust { delta } => assert!((delta - 0.2).abs() < 1e-5),
            other => panic!("expected Adjust, got {other:?}"),
        }
        assert_eq!(p.stance(), Stance::Crouched);
    }

    #[test]
    fn slow_rise_is_not_a_jump() {
        let mut p = standing_posture();
        p.track_height(1.5, 0.1);
        // 0.05 units over 100 ms is below the jump rate.
        match p.track_height(1.55, 0.2) {
            HeightAction::Adjust { .. } => {}
            other => panic!("expected Adjust, got {other:?}"),
        }
        assert_ne!(p.stance(), Stance::Jumping);
    }

    #[test]
    fn fast_rise_above_baseline_enters_jump() {
        let mut p = standing_posture();
        // 0.15 units in 50 ms: three times the threshold.
        match p.track_height(1.85, 0.05) {
            HeightAction::EnterJump { offset } => assert!((offset - 0.15).abs() < 1e-5),
            other => panic!("expected EnterJump, got {other:?}"),
        }
        assert_eq!(p.stance(), Stance::Jumping);
    }

    #[test]
    fn jump_exits_after_settling_at_baseline() {
        let mut p = standing_posture();
        p.track_height(1.85, 0.05);

        // Back at baseline, but not yet for long enough.
        assert!(matches!(
            p.track_height(1.7, 0.1),
            HeightAction::HoldJump { .. }
        ));
        assert!(matches!(
            p.track_height(1.7, 0.3),
            HeightAction::HoldJump { .. }
        ));

        // 300 ms below baseline: the jump is over.
        assert_eq!(p.track_height(1.7, 0.41), HeightAction::ExitJump);
        assert_eq!(p.stance(), Stance::Standing);
        assert_eq!(p.root_offset(), 0.0);
    }

    #[test]
    fn jump_is_forced_out_after_timeout() {
        let mut p = standing_posture();
        p.track_height(1.85, 0.05);

        // Tracker keeps reporting airborne heights past the hard limit.
        assert!(matches!(
            p.track_height(1.9, 0.3),
            HeightAction::HoldJump { .. }
        ));
        assert_eq!(p.track_height(1.9, 0.56), HeightAction::ExitJump);
    }

    #[test]
    fn slow_stretch_raises_the_jump_baseline() {
        let mut p = standing_posture();
        // Stretching slowly above standing height recalibrates the baseline.
        p.track_height(1.78, 1.0);
        p.track_height(1.7, 1.1);

        // A fast rise that stays under the new baseline is not a jump.
        match p.track_height(1.77, 1.12) {
            HeightAction::Adjust { .. } => {}
            other => panic!("expected Adjust, got {other:?}"),
        }
        assert_ne!(p.stance(), Stance::Jumping);
    }

    #[test]
    fn crouch_and_rise_clamp_to_limits() {
        let mut p = standing_posture();
        assert_eq!(p.crouch(100.0), MIN_LEG_LENGTH);
        assert_eq!(p.stance(), Stance::Crouched);

        assert_eq!(p.rise(100.0), STANDING_LEG_LENGTH);
        assert_eq!(p.stance(), Stance::Standing);
    }

    #[test]
    fn first_sample_calibrates_baseline() {
        let mut p = Posture::new();
        assert_eq!(p.track_height(1.6, 0.0), HeightAction::None);
        assert!((p.standing_head_height() - 1.6).abs() < 1e-6);
    }
}
