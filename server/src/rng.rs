use common::CoinSide;
use rand::Rng;

/// One unpredictable draw per resolution, never reused across wagers.
pub trait RandomnessSource: Send + Sync {
    /// Uniform integer in [1, 100].
    fn draw_roll(&self) -> u8;

    fn draw_side(&self) -> CoinSide;
}

pub struct ThreadRandomness;

impl RandomnessSource for ThreadRandomness {
    fn draw_roll(&self) -> u8 {
        rand::thread_rng().gen_range(1..=100)
    }

    fn draw_side(&self) -> CoinSide {
        if rand::thread_rng().gen_bool(0.5) {
            CoinSide::Heads
        } else {
            CoinSide::Tails
        }
    }
}
