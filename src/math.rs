
//! Two-dimensional sizes and positions, and the rounding rules of level sizes.

use std::convert::TryFrom;
use crate::error::{i32_to_usize, Result};

/// A pair of numbers, used for sizes, positions, and level and tile indices.
/// Orders by the first component, then by the second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// Convert both components.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> Vec2<B> {
        Vec2(map(self.0), map(self.1))
    }

    /// Width times height.
    #[inline] pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The horizontal component.
    #[inline] pub fn x(self) -> T { self.0 }

    /// The vertical component.
    #[inline] pub fn y(self) -> T { self.1 }

    /// The horizontal component of a size.
    #[inline] pub fn width(self) -> T { self.0 }

    /// The vertical component of a size.
    #[inline] pub fn height(self) -> T { self.1 }
}

impl Vec2<i32> {

    /// Fails on negative components.
    pub fn to_usize(self, error_message: &'static str) -> Result<Vec2<usize>> {
        Ok(Vec2(
            i32_to_usize(self.0, error_message)?,
            i32_to_usize(self.1, error_message)?,
        ))
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(Vec2(x, y): Vec2<T>) -> Self { (x, y) }
}


/// How level sizes and level counts are rounded when a resolution is halved.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RoundingMode {

    /// Odd sizes are rounded towards zero.
    Down,

    /// Odd sizes are rounded away from zero.
    Up,
}

impl RoundingMode {

    /// The number of times a size can be halved until it reaches one.
    /// Zero for zero and one.
    pub(crate) fn log2(self, number: usize) -> usize {
        let number = u32::try_from(number).unwrap_or(u32::MAX).max(1);
        let floor = (u32::BITS - 1 - number.leading_zeros()) as usize;

        match self {
            RoundingMode::Down => floor,
            RoundingMode::Up if number.is_power_of_two() => floor,
            RoundingMode::Up => floor + 1,
        }
    }

    /// Divide positive numbers.
    pub(crate) fn divide(self, dividend: usize, divisor: usize) -> usize {
        match self {
            RoundingMode::Up => (dividend + divisor - 1) / divisor,
            RoundingMode::Down => dividend / divisor,
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn level_count_logarithm(){
        let down = RoundingMode::Down;
        let up = RoundingMode::Up;

        for &(number, floor, ceil) in &[ (0, 0, 0), (1, 0, 0), (2, 1, 1), (3, 1, 2), (1023, 9, 10), (1024, 10, 10), (1025, 10, 11) ] {
            assert_eq!(down.log2(number), floor, "floor of {}", number);
            assert_eq!(up.log2(number), ceil, "ceil of {}", number);
        }
    }

    #[test]
    fn rounding_division(){
        assert_eq!(RoundingMode::Up.divide(10, 4), 3);
        assert_eq!(RoundingMode::Down.divide(10, 4), 2);
        assert_eq!(RoundingMode::Up.divide(8, 4), 2);
    }

    #[test]
    fn tile_indices_order_by_column_first(){
        let mut indices = vec![ Vec2(1_usize, 0_usize), Vec2(0, 2), Vec2(0, 1) ];
        indices.sort();
        assert_eq!(indices, vec![ Vec2(0, 1), Vec2(0, 2), Vec2(1, 0) ]);
    }
}
