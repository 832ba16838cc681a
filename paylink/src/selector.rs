//! Choosing one requirement out of a challenge.
//!
//! The server lists requirements in its order of preference and that order
//! is authoritative: selectors filter, they never re-rank by price.

use crate::amount::Price;
use crate::proto::{EXACT_SCHEME, PaymentRequirement};

/// Picks the requirement a client will pay.
pub trait PaymentSelector: Send + Sync {
    /// Returns the chosen requirement, or `None` if nothing is acceptable.
    fn select<'a>(&self, requirements: &'a [PaymentRequirement]) -> Option<&'a PaymentRequirement>;
}

/// First requirement, in server order, on a supported network and scheme.
pub fn select<'a, N, S>(
    requirements: &'a [PaymentRequirement],
    supported_networks: &[N],
    supported_schemes: &[S],
) -> Option<&'a PaymentRequirement>
where
    N: AsRef<str>,
    S: AsRef<str>,
{
    requirements.iter().find(|requirement| {
        supported_networks
            .iter()
            .any(|n| n.as_ref() == requirement.network)
            && supported_schemes
                .iter()
                .any(|s| s.as_ref() == requirement.scheme)
    })
}

/// The default selector: server order, filtered by local capability and an
/// optional price ceiling.
#[derive(Debug, Clone)]
pub struct FirstMatch {
    networks: Vec<String>,
    schemes: Vec<String>,
    max_price: Option<Price>,
}

impl FirstMatch {
    /// Accepts `exact` payments on `networks`.
    #[must_use]
    pub fn new<I, T>(networks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            networks: networks.into_iter().map(Into::into).collect(),
            schemes: vec![EXACT_SCHEME.to_owned()],
            max_price: None,
        }
    }

    /// Replaces the accepted schemes.
    #[must_use]
    pub fn with_schemes<I, T>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    /// Skips requirements priced above `ceiling` or in another currency.
    /// Requirements that do not advertise a price are skipped as well.
    #[must_use]
    pub fn with_max_price(mut self, ceiling: Price) -> Self {
        self.max_price = Some(ceiling);
        self
    }

    /// Networks this selector accepts.
    #[must_use]
    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    fn affordable(&self, requirement: &PaymentRequirement) -> bool {
        let Some(ceiling) = &self.max_price else {
            return true;
        };
        requirement.price.as_ref().is_some_and(|price| {
            price.currency() == ceiling.currency() && price.amount() <= ceiling.amount()
        })
    }
}

impl PaymentSelector for FirstMatch {
    fn select<'a>(&self, requirements: &'a [PaymentRequirement]) -> Option<&'a PaymentRequirement> {
        requirements
            .iter()
            .filter(|r| self.affordable(r))
            .find(|r| self.networks.contains(&r.network) && self.schemes.contains(&r.scheme))
    }
}
