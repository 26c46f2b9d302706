//! Lookup tables mapping discrete SMB347 setting indices to milliamps.

/// Fast-charge current per `CFG_CHARGE_CURRENT[7:5]` index, in mA.
pub const FAST_CHARGE_MA: [u16; 8] = [700, 900, 1200, 1500, 1800, 2000, 2200, 2500];

/// Pre-charge current per `CFG_CHARGE_CURRENT[4:3]` index, in mA.
pub const PRE_CHARGE_MA: [u16; 4] = [100, 150, 200, 250];

/// Input current limit per `CFG_CURRENT_LIMIT[3:0]` index, in mA.
///
/// The AICL result reported in `STAT_E` uses the same encoding.
pub const INPUT_CURRENT_MA: [u16; 10] = [300, 500, 700, 900, 1200, 1500, 1800, 2000, 2200, 2500];

/// Highest input current the charger accepts, in mA.
pub const INPUT_CURRENT_MAX_MA: u16 = INPUT_CURRENT_MA[INPUT_CURRENT_MA.len() - 1];

/// Index of the highest fast-charge current.
pub const FAST_CHARGE_MAX_INDEX: u8 = (FAST_CHARGE_MA.len() - 1) as u8;

/// Searches `table` from its largest entry downward and returns the index of the
/// largest value that does not exceed `limit_ma`.
///
/// The tables are sorted ascending, so the first hit from the top is the best fit.
pub fn search_down(table: &[u16], limit_ma: u16) -> Option<u8> {
    table
        .iter()
        .rposition(|&ma| ma <= limit_ma)
        .map(|index| index as u8)
}

/// Decodes the raw AICL result nibble into milliamps.
///
/// Codes past the end of the table saturate at the highest row.
pub fn aicl_result_ma(raw: u8) -> u16 {
    let index = usize::from(raw).min(INPUT_CURRENT_MA.len() - 1);
    INPUT_CURRENT_MA[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted() {
        assert!(FAST_CHARGE_MA.windows(2).all(|w| w[0] < w[1]));
        assert!(PRE_CHARGE_MA.windows(2).all(|w| w[0] < w[1]));
        assert!(INPUT_CURRENT_MA.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn search_picks_largest_entry_not_above_limit() {
        assert_eq!(search_down(&FAST_CHARGE_MA, 1400), Some(2));
        assert_eq!(search_down(&FAST_CHARGE_MA, 1500), Some(3));
        assert_eq!(search_down(&FAST_CHARGE_MA, u16::MAX), Some(7));
        assert_eq!(search_down(&FAST_CHARGE_MA, 699), None);
        assert_eq!(search_down(&PRE_CHARGE_MA, 360), Some(3));
        assert_eq!(search_down(&INPUT_CURRENT_MA, 0), None);
    }

    #[test]
    fn aicl_saturates() {
        assert_eq!(aicl_result_ma(0), 300);
        assert_eq!(aicl_result_ma(9), 2500);
        assert_eq!(aicl_result_ma(0x0F), 2500);
        assert_eq!(INPUT_CURRENT_MAX_MA, 2500);
        assert_eq!(FAST_CHARGE_MAX_INDEX, 7);
    }
}
