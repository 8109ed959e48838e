//! Global-ID lists from foreign-typed or textual sources.
//!
//! Constructors take `&[i64]`; these helpers turn loosely typed input into
//! such a list and report the first entry that is not an integer.

use std::fmt::Debug;

use crate::map_error::BlockMapError;

/// Convert every item to `i64`, failing on the first one that does not fit.
///
/// ```
/// use block_map::data::gid_list::try_collect_gids;
/// assert_eq!(try_collect_gids([3u32, 1, 2]).unwrap(), vec![3, 1, 2]);
/// assert!(try_collect_gids([0u64, u64::MAX]).is_err());
/// ```
pub fn try_collect_gids<I, T>(items: I) -> Result<Vec<i64>, BlockMapError>
where
    I: IntoIterator<Item = T>,
    T: TryInto<i64> + Debug + Clone,
{
    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            TryInto::<i64>::try_into(item.clone()).map_err(|_| BlockMapError::NotAnInteger {
                position,
                value: format!("{item:?}"),
            })
        })
        .collect()
}

/// Parse a whitespace- or comma-separated list of integers.
pub fn parse_gids(text: &str) -> Result<Vec<i64>, BlockMapError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .enumerate()
        .map(|(position, tok)| {
            tok.parse::<i64>()
                .map_err(|_| BlockMapError::NotAnInteger {
                    position,
                    value: tok.to_string(),
                })
        })
        .collect()
}
