use common::{Amount, GameError};

/// The result of resolving one solo wager. The resolver itself never touches
/// the ledger; the caller applies `net` and records the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WagerOutcome {
    pub roll: u8,
    pub won: bool,
    pub payout: Amount,
    pub net: i64,
}

pub fn validate(stake: Amount, balance: Amount, win_chance: u8) -> Result<(), GameError> {
    if stake == 0 || stake > balance {
        return Err(GameError::InvalidStake);
    }
    if !(1..=99).contains(&win_chance) {
        return Err(GameError::InvalidProbability);
    }
    Ok(())
}

/// Win iff the roll lands at or under the chosen win chance. The payout
/// multiplier is exactly 100 / win_chance with no house edge; fractional
/// minor units are truncated.
pub fn resolve(stake: Amount, win_chance: u8, roll: u8) -> WagerOutcome {
    let won = roll <= win_chance;
    let payout = if won {
        (stake as u128 * 100 / win_chance as u128) as Amount
    } else {
        0
    };
    let net = payout as i64 - stake as i64;
    WagerOutcome {
        roll,
        won,
        payout,
        net,
    }
}
