use serde::{Deserialize, Serialize};

use tagrush_core::level::{Rect, Spawn};

/// Arena width in pixels.
pub const ARENA_WIDTH: f32 = 800.0;
/// Arena height in pixels.
pub const ARENA_HEIGHT: f32 = 400.0;
/// Player bounding box edge length.
pub const PLAYER_SIZE: f32 = 40.0;
/// Horizontal move speed (px per tick).
pub const MOVE_SPEED: f32 = 5.0;
/// Gravity acceleration (px per tick^2, y-down).
pub const GRAVITY: f32 = 0.6;
/// Jump impulse (px per tick, upward).
pub const JUMP_VELOCITY: f32 = -12.0;

/// Held-key movement intent, updated by key edges from the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFlags {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

/// Kinematic state of one player box. Coordinates are the top-left corner
/// of the 40x40 AABB, y-down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerBody {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
}

impl PlayerBody {
    pub fn at_spawn(spawn: Spawn) -> Self {
        Self {
            x: spawn.x,
            y: spawn.y,
            vx: 0.0,
            vy: 0.0,
            grounded: true,
        }
    }

    pub fn aabb(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            w: PLAYER_SIZE,
            h: PLAYER_SIZE,
        }
    }
}

/// Advance one player one tick.
///
/// Collision is discrete: after integrating, each platform is tested against
/// the AABB and resolved using the previous frame's vertical extent to decide
/// landing vs. head bump. Fast bodies can tunnel through thin platforms; that
/// is the intended resolution rule, not a continuous sweep.
pub fn step_player(body: &mut PlayerBody, intent: IntentFlags, platforms: &[Rect]) {
    // Right wins if both flags are somehow set; key-edge discipline on the
    // client means at most one should be true.
    body.vx = if intent.right {
        MOVE_SPEED
    } else if intent.left {
        -MOVE_SPEED
    } else {
        0.0
    };

    if intent.jump && body.grounded {
        body.vy = JUMP_VELOCITY;
        body.grounded = false;
    }

    body.vy += GRAVITY;

    let prev_top = body.y;
    let prev_bottom = body.y + PLAYER_SIZE;

    body.x += body.vx;
    body.y += body.vy;

    // Arena side walls and ceiling.
    body.x = body.x.clamp(0.0, ARENA_WIDTH - PLAYER_SIZE);
    if body.y < 0.0 {
        body.y = 0.0;
        if body.vy < 0.0 {
            body.vy = 0.0;
        }
    }

    body.grounded = false;

    for platform in platforms {
        if !body.aabb().overlaps(platform) {
            continue;
        }
        if body.vy > 0.0 && prev_bottom <= platform.top() {
            // Falling with last frame's bottom edge above the surface: land.
            body.y = platform.top() - PLAYER_SIZE;
            body.vy = 0.0;
            body.grounded = true;
        } else if body.vy < 0.0 && prev_top >= platform.bottom() {
            // Rising with last frame's top edge below the underside: bump.
            body.y = platform.bottom();
            body.vy = 0.0;
        }
    }

    // Arena floor.
    if body.y + PLAYER_SIZE >= ARENA_HEIGHT {
        body.y = ARENA_HEIGHT - PLAYER_SIZE;
        body.vy = 0.0;
        body.grounded = true;
    }
}
