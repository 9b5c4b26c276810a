use core::ops::{Add, Div, Mul, Sub};

macro_rules! constrained_f64 {
    ( $name:ident, $closure:tt, $msg:expr, $closure2:tt, $msg2:expr) => {
        #[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
        pub struct $name(f64);

        impl $name {
            pub fn new(x: f64) -> Self {
                assert!(($closure)(x), $msg);
                Self(x)
            }

            pub fn try_new(x: f64) -> Option<Self> {
                if ($closure)(x) {
                    Some(Self(x))
                } else {
                    None
                }
            }

            pub fn new_with_variable_constraint(x: f64, y: f64) -> Self {
                assert!(($closure2)(x, y), $msg2);
                Self(x)
            }

            pub fn try_new_with_variable_constraint(x: f64, y: f64) -> Option<Self> {
                if ($closure2)(x, y) {
                    Some(Self(x))
                } else {
                    None
                }
            }

            pub fn unwrap(self) -> f64 {
                self.0
            }

            pub fn ln(self) -> f64 {
                self.0.ln()
            }
        }

        impl Add<f64> for $name {
            type Output = f64;

            fn add(self, other: f64) -> f64 {
                self.0 + other
            }
        }

        impl Add<$name> for f64 {
            type Output = f64;

            fn add(self, other: $name) -> f64 {
                self + other.0
            }
        }

        impl Sub<f64> for $name {
            type Output = f64;

            fn sub(self, other: f64) -> f64 {
                self.0 - other
            }
        }

        impl Sub<$name> for f64 {
            type Output = f64;

            fn sub(self, other: $name) -> f64 {
                self - other.0
            }
        }

        impl Mul<f64> for $name {
            type Output = f64;

            fn mul(self, other: f64) -> f64 {
                self.0 * other
            }
        }

        impl Mul<$name> for f64 {
            type Output = f64;

            fn mul(self, other: $name) -> f64 {
                self * other.0
            }
        }

        impl Div<f64> for $name {
            type Output = f64;

            fn div(self, other: f64) -> f64 {
                self.0 / other
            }
        }

        impl Div<$name> for f64 {
            type Output = f64;

            fn div(self, other: $name) -> f64 {
                self / other.0
            }
        }
    };
}

// Pitman-Yor concentration.  The variable constraint is relative to the discount.
constrained_f64!(
    Strength,
    (|x| x > 0.0),
    "Strength must be greater than zero.",
    (|x, y: f64| x > -y),
    "Strength must be greater than the negative of the discount."
);

constrained_f64!(
    Discount,
    (|x| (0.0..1.0).contains(&x)),
    "Discount must be in [0,1).",
    (|_x, _y| false),
    "Not supported."
);

// Shape or rate of a hyperparameter prior.
constrained_f64!(
    Shape,
    (|x: f64| x > 0.0 && x.is_finite()),
    "Shape must be finite and greater than zero.",
    (|_x, _y| false),
    "Not supported."
);
