//! City coordinates, distances and tour fitness.
//!
//! A tour is a permutation of city indices, implicitly cyclic: the last
//! city connects back to the first. Its fitness is the total Euclidean
//! length of that cycle. Lower is better.

use crate::error::{Result, SearchError};

/// A city in the plane, identified only by its index in the city list.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct City {
    pub x: f64,
    pub y: f64,
}

impl City {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &City) -> f64 {
        distance(self, other)
    }
}

impl From<(f64, f64)> for City {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two cities.
#[inline]
pub fn distance(a: &City, b: &City) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Cyclic tour length without validating `order`.
///
/// Callers must have checked the order with [`validate_tour`]; the search
/// loops validate once and then call this on every candidate.
///
/// # Panics
/// Panics if an index in `order` is out of range for `cities`.
pub fn tour_length(cities: &[City], order: &[usize]) -> f64 {
    debug_assert_eq!(cities.len(), order.len());
    let Some((&first, &last)) = order.first().zip(order.last()) else {
        return 0.0;
    };
    let open: f64 = order
        .windows(2)
        .map(|w| distance(&cities[w[0]], &cities[w[1]]))
        .sum();
    open + distance(&cities[last], &cities[first])
}

/// Checks that `order` is a permutation of `0..cities.len()`.
///
/// # Errors
/// Returns [`SearchError::InvalidInput`] for an empty city list, a length
/// mismatch, an out-of-range index or a repeated index.
pub fn validate_tour(cities: &[City], order: &[usize]) -> Result<()> {
    if cities.is_empty() {
        return Err(SearchError::InvalidInput("city list is empty".into()));
    }
    if order.len() != cities.len() {
        return Err(SearchError::InvalidInput(format!(
            "order has {} entries but there are {} cities",
            order.len(),
            cities.len()
        )));
    }
    let mut seen = vec![false; cities.len()];
    for (pos, &city) in order.iter().enumerate() {
        match seen.get_mut(city) {
            None => {
                return Err(SearchError::InvalidInput(format!(
                    "city index {city} at position {pos} is out of range"
                )))
            }
            Some(true) => {
                return Err(SearchError::InvalidInput(format!(
                    "city index {city} appears more than once"
                )))
            }
            Some(slot) => *slot = true,
        }
    }
    Ok(())
}

/// Total cyclic length of `order` over `cities`.
///
/// # Errors
/// Rejects orders that are not a permutation of the city indices, see
/// [`validate_tour`].
///
/// # Examples
///
/// ```
/// use u_tsp::geometry::{fitness, City};
///
/// let square = [
///     City::new(0.0, 0.0),
///     City::new(0.0, 1.0),
///     City::new(1.0, 1.0),
///     City::new(1.0, 0.0),
/// ];
/// let len = fitness(&square, &[0, 1, 2, 3]).unwrap();
/// assert!((len - 4.0).abs() < 1e-12);
/// ```
pub fn fitness(cities: &[City], order: &[usize]) -> Result<f64> {
    validate_tour(cities, order)?;
    Ok(tour_length(cities, order))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<City> {
        vec![
            City::new(0.0, 0.0),
            City::new(0.0, 1.0),
            City::new(1.0, 1.0),
            City::new(1.0, 0.0),
        ]
    }

    #[test]
    fn test_distance_pythagorean() {
        let a = City::new(0.0, 0.0);
        let b = City::new(3.0, 4.0);
        assert!((distance(&a, &b) - 5.0).abs() < 1e-12);
        assert!((b.distance_to(&a) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_square_perimeter() {
        let len = fitness(&square(), &[0, 1, 2, 3]).unwrap();
        assert!((len - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_square_crossed() {
        // 0 -> 2 -> 1 -> 3 crosses both diagonals
        let len = fitness(&square(), &[0, 2, 1, 3]).unwrap();
        let expected = 2.0 + 2.0 * 2f64.sqrt();
        assert!((len - expected).abs() < 1e-12);
    }

    #[test]
    fn test_single_city_zero() {
        let cities = [City::new(5.0, 7.0)];
        assert_eq!(fitness(&cities, &[0]).unwrap(), 0.0);
    }

    #[test]
    fn test_two_cities_round_trip() {
        let cities = [City::new(0.0, 0.0), City::new(3.0, 4.0)];
        let len = fitness(&cities, &[1, 0]).unwrap();
        assert!((len - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let err = fitness(&square(), &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, SearchError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            fitness(&[], &[]),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_index() {
        assert!(validate_tour(&square(), &[0, 1, 1, 3]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(validate_tour(&square(), &[0, 1, 2, 4]).is_err());
    }

    #[test]
    fn test_rotation_and_reversal_invariant() {
        let cities = vec![
            City::new(0.0, 0.0),
            City::new(2.0, 1.0),
            City::new(5.0, 3.0),
            City::new(1.0, 4.0),
            City::new(-2.0, 2.0),
        ];
        let order = [3, 0, 4, 1, 2];
        let base = tour_length(&cities, &order);

        let mut rotated = order.to_vec();
        rotated.rotate_left(2);
        assert!((tour_length(&cities, &rotated) - base).abs() < 1e-9);

        let mut reversed = order.to_vec();
        reversed.reverse();
        assert!((tour_length(&cities, &reversed) - base).abs() < 1e-9);
    }
}
