//! Swap sequence parsing and the predefined policy table.

use shared_types::ValidationError;

/// Swap sequence input: an explicit rank list, or a name resolved against
/// the predefined table. A bare policy name (`asap`, `baln`, `l2r`, `r2l`)
/// is resolved against the route length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapSpec {
    Explicit(Vec<u32>),
    Named(String),
}

impl From<Vec<u32>> for SwapSpec {
    fn from(seq: Vec<u32>) -> Self {
        SwapSpec::Explicit(seq)
    }
}

impl From<&str> for SwapSpec {
    fn from(name: &str) -> Self {
        SwapSpec::Named(name.to_string())
    }
}

const PREDEFINED: &[(&str, &[u32])] = &[
    // disable swapping (for studying isolated links)
    ("no_swap", &[0, 0, 0]),
    // for 1-repeater
    ("swap_1", &[1, 0, 1]),
    ("swap_1_asap", &[1, 0, 1]),
    // for 2-repeater
    ("swap_2_asap", &[1, 0, 0, 1]),
    ("swap_2_l2r", &[2, 0, 1, 2]),
    ("swap_2_r2l", &[2, 1, 0, 2]),
    // for 3-repeater
    ("swap_3_asap", &[1, 0, 0, 0, 1]),
    ("swap_3_baln", &[2, 0, 1, 0, 2]),
    ("swap_3_l2r", &[3, 0, 1, 2, 3]),
    ("swap_3_r2l", &[3, 2, 1, 0, 3]),
    // for 4-repeater
    ("swap_4_asap", &[1, 0, 0, 0, 0, 1]),
    ("swap_4_baln", &[3, 0, 1, 0, 2, 3]),
    ("swap_4_baln2", &[3, 2, 0, 1, 0, 3]),
    ("swap_4_l2r", &[4, 0, 1, 2, 3, 4]),
    ("swap_4_r2l", &[4, 3, 2, 1, 0, 4]),
    // for 5-repeater
    ("swap_5_asap", &[1, 0, 0, 0, 0, 0, 1]),
    ("swap_5_baln", &[3, 0, 1, 0, 2, 0, 3]),
    ("swap_5_baln2", &[3, 0, 2, 0, 1, 0, 3]),
    ("swap_5_l2r", &[5, 0, 1, 2, 3, 4, 5]),
    ("swap_5_r2l", &[5, 4, 3, 2, 1, 0, 5]),
];

fn lookup(name: &str) -> Option<&'static [u32]> {
    PREDEFINED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, seq)| *seq)
}

/// Resolve a swap sequence input against a route.
pub fn parse_swap_sequence(input: &SwapSpec, route_len: usize) -> Result<Vec<u32>, ValidationError> {
    let swap: Vec<u32> = match input {
        SwapSpec::Explicit(seq) => seq.clone(),
        SwapSpec::Named(name) => {
            let found = lookup(name)
                .or_else(|| lookup(&format!("swap_{}_{name}", route_len.saturating_sub(2))));
            match found {
                Some(seq) => seq.to_vec(),
                None => {
                    return Err(ValidationError::UnknownSwapSequence {
                        name: name.clone(),
                        nodes: route_len,
                    })
                }
            }
        }
    };

    if swap.len() != route_len {
        return Err(ValidationError::SwapLengthMismatch {
            swap: swap.len(),
            route: route_len,
        });
    }
    Ok(swap)
}
