// Activation functions.
//
// Derivatives are taken with respect to the value a neuron already holds
// (the activated output of the previous commit), not the pre-activation input.

use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::node::NeuronRole;

/// Negative-side slope of the leaky rectifier.
pub const LEAKY_RELU_ALPHA: f64 = 0.1;

/// Ceiling of the leaky rectifier used by tag dispatch.
pub const LEAKY_RELU_MAX: f64 = 1.0;

/// Scale of the exponential-linear negative branch.
pub const ELU_ALPHA: f64 = 1.0;

/// Ceiling of the exponential-linear unit used by tag dispatch (none).
pub const ELU_MAX: f64 = f64::INFINITY;

/// Symbolic activation tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Activation {
    /// Identity; derivative is zero.
    #[default]
    None,
    Sigmoid,
    Relu,
    LeakyRelu,
    Elu,
}

impl Activation {
    pub const ALL: [Activation; 5] = [
        Activation::None,
        Activation::Sigmoid,
        Activation::Relu,
        Activation::LeakyRelu,
        Activation::Elu,
    ];

    #[inline]
    pub fn value(self, x: f64) -> f64 {
        match self {
            Activation::None => x,
            Activation::Sigmoid => sigmoid(x),
            Activation::Relu => relu(x),
            Activation::LeakyRelu => leaky_relu(x, LEAKY_RELU_ALPHA, LEAKY_RELU_MAX),
            Activation::Elu => elu(x, ELU_ALPHA, ELU_MAX),
        }
    }

    #[inline]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Activation::None => 0.0,
            Activation::Sigmoid => sigmoid_derivative(x),
            Activation::Relu => relu_derivative(x),
            Activation::LeakyRelu => {
                leaky_relu_derivative(x, LEAKY_RELU_ALPHA, LEAKY_RELU_MAX)
            }
            Activation::Elu => elu_derivative(x, ELU_ALPHA, ELU_MAX),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::None => "NONE",
            Activation::Sigmoid => "SIGMOID",
            Activation::Relu => "RELU",
            Activation::LeakyRelu => "LEAKY_RELU",
            Activation::Elu => "ELU",
        }
    }

    /// Parse a symbolic tag. Unknown tags map to identity.
    pub fn from_tag(tag: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(tag.trim()))
            .unwrap_or(Activation::None)
    }
}

impl FromStr for Activation {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl core::fmt::Display for Activation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Role → activation mapping applied whenever a neuron's edge set changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivationScheme {
    pub input: Activation,
    pub output: Activation,
    pub interior: Activation,
}

impl Default for ActivationScheme {
    fn default() -> Self {
        Self {
            input: Activation::Relu,
            output: Activation::Sigmoid,
            interior: Activation::LeakyRelu,
        }
    }
}

impl ActivationScheme {
    /// Identity everywhere. Useful for hand-checked graphs.
    pub fn identity() -> Self {
        Self {
            input: Activation::None,
            output: Activation::None,
            interior: Activation::None,
        }
    }

    pub fn for_role(&self, role: NeuronRole) -> Activation {
        match role {
            NeuronRole::Unassigned => Activation::None,
            NeuronRole::Input => self.input,
            NeuronRole::Output => self.output,
            NeuronRole::Interior => self.interior,
        }
    }
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `y` is the already-activated value.
#[inline]
pub fn sigmoid_derivative(y: f64) -> f64 {
    y * (1.0 - y)
}

#[inline]
pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

#[inline]
pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

#[inline]
pub fn leaky_relu(x: f64, alpha: f64, max: f64) -> f64 {
    if x > 0.0 {
        x.min(max)
    } else {
        alpha * x
    }
}

#[inline]
pub fn leaky_relu_derivative(x: f64, alpha: f64, max: f64) -> f64 {
    if x == max {
        0.0
    } else if x > 0.0 {
        1.0
    } else {
        alpha
    }
}

#[inline]
pub fn elu(x: f64, alpha: f64, max: f64) -> f64 {
    if x > 0.0 {
        x.min(max)
    } else {
        alpha * (x.exp() - 1.0)
    }
}

#[inline]
pub fn elu_derivative(x: f64, alpha: f64, max: f64) -> f64 {
    if x == max {
        0.0
    } else if x > 0.0 {
        1.0
    } else {
        alpha * x.exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn literal_values() {
        assert_eq!(Activation::Sigmoid.value(0.0), 0.5);
        assert_eq!(Activation::Relu.value(-3.0), 0.0);
        assert_eq!(Activation::Relu.value(3.0), 3.0);
        assert!((Activation::LeakyRelu.value(-10.0) - -1.0).abs() < EPS);
        let expected = (-1.0f64).exp() - 1.0;
        assert!((Activation::Elu.value(-1.0) - expected).abs() < EPS);
        assert!((Activation::Elu.value(-1.0) - -0.632).abs() < 1e-3);
    }

    #[test]
    fn identity_has_zero_derivative() {
        assert_eq!(Activation::None.value(2.5), 2.5);
        assert_eq!(Activation::None.derivative(2.5), 0.0);
    }

    #[test]
    fn sigmoid_derivative_uses_activated_value() {
        let y = Activation::Sigmoid.value(0.0);
        assert_eq!(Activation::Sigmoid.derivative(y), 0.25);
    }

    #[test]
    fn leaky_relu_ceiling_and_slopes() {
        assert_eq!(Activation::LeakyRelu.value(5.0), LEAKY_RELU_MAX);
        assert_eq!(Activation::LeakyRelu.derivative(LEAKY_RELU_MAX), 0.0);
        assert_eq!(Activation::LeakyRelu.derivative(0.5), 1.0);
        assert_eq!(Activation::LeakyRelu.derivative(-0.5), LEAKY_RELU_ALPHA);
        assert_eq!(leaky_relu(5.0, 0.1, f64::INFINITY), 5.0);
    }

    #[test]
    fn elu_ceiling_is_optional() {
        assert_eq!(Activation::Elu.value(7.0), 7.0);
        assert_eq!(elu(7.0, 1.0, 2.0), 2.0);
        assert_eq!(elu_derivative(2.0, 1.0, 2.0), 0.0);
        assert!((Activation::Elu.derivative(-1.0) - (-1.0f64).exp()).abs() < EPS);
    }

    #[test]
    fn non_finite_input_propagates() {
        assert!(Activation::None.value(f64::NAN).is_nan());
        assert!(Activation::Sigmoid.value(f64::NAN).is_nan());
        assert_eq!(Activation::Sigmoid.value(f64::INFINITY), 1.0);
        assert_eq!(Activation::Relu.value(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn tags_parse_and_unknown_maps_to_identity() {
        assert_eq!(Activation::from_tag("SIGMOID"), Activation::Sigmoid);
        assert_eq!(Activation::from_tag("leaky_relu"), Activation::LeakyRelu);
        assert_eq!("ELU".parse::<Activation>().unwrap(), Activation::Elu);
        assert_eq!(Activation::from_tag("SOFTMAX"), Activation::None);
        for a in Activation::ALL {
            assert_eq!(Activation::from_tag(&a.to_string()), a);
        }
    }
}
