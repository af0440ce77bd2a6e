use crate::error::Error;

/// Host side gas meter. An infinite meter has no limit and never runs out.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GasMeter {
    limit: Option<u64>,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        GasMeter {
            limit: Some(limit),
            consumed: 0,
        }
    }

    pub fn infinite() -> Self {
        GasMeter {
            limit: None,
            consumed: 0,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Consumed gas capped at the limit. A failed charge may push
    /// `consumed` past the limit, this is what a parent gets billed.
    pub fn consumed_to_limit(&self) -> u64 {
        match self.limit {
            Some(limit) => self.consumed.min(limit),
            None => self.consumed,
        }
    }

    /// `u64::MAX` for an infinite meter.
    pub fn remaining(&self) -> u64 {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.consumed),
            None => u64::MAX,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self.limit, Some(limit) if self.consumed >= limit)
    }

    pub fn is_past_limit(&self) -> bool {
        matches!(self.limit, Some(limit) if self.consumed > limit)
    }

    /// Charge `amount`. The charge is recorded even when it crosses the
    /// limit, and crossing it is [`Error::OutOfGas`].
    pub fn consume_gas(&mut self, amount: u64, descriptor: &str) -> Result<(), Error> {
        match self.consumed.checked_add(amount) {
            Some(consumed) => self.consumed = consumed,
            None => {
                self.consumed = u64::MAX;
                return Err(Error::OutOfGas(format!("{descriptor}: gas overflow")));
            }
        }
        if self.is_past_limit() {
            return Err(Error::OutOfGas(descriptor.into()));
        }
        Ok(())
    }

    /// Burn whatever is left, used when a transaction aborts on gas.
    pub fn consume_remaining(&mut self) {
        if let Some(limit) = self.limit {
            self.consumed = self.consumed.max(limit);
        }
    }
}
