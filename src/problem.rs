//! TSPLIB problem files.
//!
//! Reads the `NODE_COORD_SECTION` of a TSPLIB file:
//!
//! ```text
//! NAME : square4
//! TYPE : TSP
//! DIMENSION : 4
//! EDGE_WEIGHT_TYPE : EUC_2D
//! NODE_COORD_SECTION
//! 1 0 0
//! 2 0 1
//! 3 1 1
//! 4 1 0
//! EOF
//! ```
//!
//! The node number on each line is ignored; cities are identified by their
//! position in the section.

use crate::error::{Result, SearchError};
use crate::geometry::City;
use std::path::Path;

/// Parses TSPLIB text into a city list.
///
/// # Errors
/// [`SearchError::Parse`] on a malformed coordinate line, a missing or
/// empty coordinate section, or a `DIMENSION` that disagrees with the
/// number of coordinates.
pub fn parse_tsplib(text: &str) -> Result<Vec<City>> {
    let mut cities = Vec::new();
    let mut dimension: Option<(usize, usize)> = None;
    let mut in_section = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line == "EOF" {
            break;
        }

        if !in_section {
            if line == "NODE_COORD_SECTION" {
                in_section = true;
            } else if let Some((key, value)) = line.split_once(':') {
                if key.trim() == "DIMENSION" {
                    let n = value.trim().parse::<usize>().map_err(|_| SearchError::Parse {
                        line: line_no,
                        message: format!("invalid DIMENSION '{}'", value.trim()),
                    })?;
                    dimension = Some((n, line_no));
                }
            }
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(_), Some(x), Some(y), None) = (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(SearchError::Parse {
                line: line_no,
                message: format!("expected 'index x y', got '{line}'"),
            });
        };
        let coord = |s: &str| {
            s.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| SearchError::Parse {
                line: line_no,
                message: format!("invalid coordinate '{s}'"),
            })
        };
        cities.push(City::new(coord(x)?, coord(y)?));
    }

    if !in_section {
        return Err(SearchError::Parse {
            line: text.lines().count(),
            message: "missing NODE_COORD_SECTION".into(),
        });
    }
    if cities.is_empty() {
        return Err(SearchError::Parse {
            line: text.lines().count(),
            message: "NODE_COORD_SECTION has no coordinates".into(),
        });
    }
    if let Some((n, line)) = dimension {
        if n != cities.len() {
            return Err(SearchError::Parse {
                line,
                message: format!("DIMENSION is {n} but {} coordinates were read", cities.len()),
            });
        }
    }
    Ok(cities)
}

/// Reads and parses a TSPLIB file.
pub fn load_tsplib(path: impl AsRef<Path>) -> Result<Vec<City>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| SearchError::io(path, e))?;
    parse_tsplib(&text)
}

/// The order `0, 1, ..., n - 1`.
pub fn identity_order(n: usize) -> Vec<usize> {
    (0..n).collect()
}
