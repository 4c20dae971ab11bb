//! Per-participant balance arithmetic shared by `leave` and `end`.
//!
//! A participant's investment is the absolute buy-in plus every rebuy. On exit
//! the chips they walk away with are compared against that investment and the
//! difference is converted to money at the game's multiplier. The resulting
//! amount is added to the user's running balance as a delta; balances are never
//! overwritten.

use super::types::{Chips, Money};

/// Convert chips to money using the game's multiplier.
pub fn chips_to_money(chips: Chips, multiplier: Chips) -> Money {
    chips as Money / multiplier as Money
}

/// Convert money back to chips using the game's multiplier.
pub fn money_to_chips(money: Money, multiplier: Chips) -> Money {
    money * multiplier as Money
}

/// Total chips a participant has put into the game.
pub fn investment(initial_chips: Chips, total_rebuys_chips: Chips) -> Chips {
    initial_chips.abs() + total_rebuys_chips
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitBalance {
    pub exit_chips: Chips,
    pub investment: Chips,
    pub net_chips: Chips,
    pub net_money: Money,
}

/// Net result for a participant leaving with `exit_chips`.
pub fn exit_balance(
    exit_chips: Chips,
    initial_chips: Chips,
    total_rebuys_chips: Chips,
    multiplier: Chips,
) -> ExitBalance {
    let investment = investment(initial_chips, total_rebuys_chips);
    let net_chips = exit_chips - investment;
    ExitBalance {
        exit_chips,
        investment,
        net_chips,
        net_money: chips_to_money(net_chips, multiplier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn investment_counts_buy_in_magnitude_and_rebuys() {
        assert_eq!(investment(-1000, 500), 1500);
        assert_eq!(investment(0, 0), 0);
        assert_eq!(investment(-200, 0), 200);
    }

    #[test]
    fn exit_balance_converts_net_chips_at_multiplier() {
        let winner = exit_balance(2000, -1000, 500, 5);
        assert_eq!(winner.investment, 1500);
        assert_eq!(winner.net_chips, 500);
        assert!((winner.net_money - 100.0).abs() < 1e-9);

        let loser = exit_balance(800, -1000, 0, 5);
        assert_eq!(loser.net_chips, -200);
        assert!((loser.net_money + 40.0).abs() < 1e-9);
    }

    #[test]
    fn busting_out_loses_full_investment() {
        let bust = exit_balance(0, -300, 300, 3);
        assert_eq!(bust.net_chips, -600);
        assert!((bust.net_money + 200.0).abs() < 1e-9);
    }

    #[test]
    fn conversion_helpers_are_inverse() {
        let money = chips_to_money(750, 5);
        assert!((money - 150.0).abs() < 1e-9);
        assert!((money_to_chips(money, 5) - 750.0).abs() < 1e-9);
    }
}
