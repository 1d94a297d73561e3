//! Time regulation, time constraint and the lower bound computations

use tracing::{debug, info};

use super::Federation;
use crate::clock::min_time;
use crate::error::{FederationError, Result};
use crate::handles::{FederateHandle, FederationTime};
use crate::message::Payload;
use crate::response::Responses;

impl Federation {
    /// Make `federate` a regulator starting at `time`
    ///
    /// Everybody else learns about the new regulator; the caller gets the
    /// enable acknowledgment last.
    pub fn add_regulator(&mut self, federate: FederateHandle, time: FederationTime) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %time, "Federation::add_regulator: called");
        if self.federate(federate)?.is_regulator() || self.clocks.contains(federate) {
            return Err(FederationError::internal("Time regulation already enabled."));
        }

        self.clocks.insert(federate, time)?;
        self.federate_mut(federate)?.set_regulator(true)?;
        info!(%federate, %time, "Federate is now a regulator");

        let responses = vec![
            self.respond_to_all(
                Some(federate),
                federate,
                Payload::SetTimeRegulating {
                    regulating: true,
                    date: time,
                },
            ),
            self.respond_to(federate, federate, Payload::TimeRegulationEnabled { date: time }),
        ];
        self.notify_mom(|mom| mom.time_regulation_changed(federate, true, time));
        Ok(responses)
    }

    /// Record a regulator's new time and relay it as a null message
    ///
    /// An anonymous update relays a bound computed by the broker itself: no
    /// federate is validated or updated, the advertised source is handle 0
    /// and every federate receives it.
    pub fn update_regulator(&mut self, federate: FederateHandle, time: FederationTime, anonymous: bool) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %time, %anonymous, "Federation::update_regulator: called");
        if !anonymous {
            if !self.federate(federate)?.is_regulator() {
                return Err(FederationError::internal("Time regulation not enabled."));
            }
            self.clocks.update(federate, time)?;
        }

        let response = if anonymous {
            self.respond_to_all(None, FederateHandle::ANONYMOUS, Payload::MessageNull { date: time })
        } else {
            self.respond_to_all(Some(federate), federate, Payload::MessageNull { date: time })
        };
        Ok(vec![response])
    }

    pub fn remove_regulator(&mut self, federate: FederateHandle) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, "Federation::remove_regulator: called");
        if !self.federate(federate)?.is_regulator() {
            return Err(FederationError::internal("Time regulation not enabled."));
        }

        let time = self.clocks.remove(federate)?;
        self.federate_mut(federate)?.set_regulator(false)?;
        info!(%federate, "Federate is not a regulator anymore");

        let responses = vec![self.respond_to_all(
            Some(federate),
            federate,
            Payload::SetTimeRegulating {
                regulating: false,
                date: time,
            },
        )];
        self.notify_mom(|mom| mom.time_regulation_changed(federate, false, time));
        Ok(responses)
    }

    /// Toggle time constraint; only enabling is acknowledged
    pub fn set_constrained(&mut self, federate: FederateHandle, constrained: bool, time: FederationTime) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %constrained, %time, "Federation::set_constrained: called");
        self.federate_mut(federate)?.set_constrained(constrained)?;

        let mut responses = Responses::new();
        if constrained {
            responses.push(self.respond_to(federate, federate, Payload::TimeConstrainedEnabled { date: time }));
        }
        self.notify_mom(|mom| mom.time_constrained_changed(federate, constrained));
        Ok(responses)
    }

    /// Lower bound over the regulators, `None` when nobody regulates
    pub fn lbts(&self) -> Option<FederationTime> {
        self.clocks.lbts()
    }

    /// Last published NERx bound
    pub fn min_nerx(&self) -> FederationTime {
        self.min_nerx
    }

    /// Lower bound with each NERx user's requested time in place of its clock
    ///
    /// Zero unless at least two regulators are currently using NERx.
    pub fn compute_min_nerx(&self) -> FederationTime {
        let mut users = 0;
        let snapshot: Vec<FederationTime> = self
            .clocks
            .clocks()
            .map(|(handle, time)| match self.federates.get(&handle) {
                Some(f) if f.is_using_nerx() => {
                    users += 1;
                    f.last_nerx_value()
                }
                _ => time,
            })
            .collect();

        let min = min_time(snapshot).unwrap_or(FederationTime::ZERO);
        debug!(%min, %users, "Federation::compute_min_nerx: computed");
        if users < 2 { FederationTime::ZERO } else { min }
    }

    /// Record a NERx request and report whether the published bound moved up
    ///
    /// When it does, every federate's NERx flag is cleared so that federates
    /// still waiting must ask again. Callers broadcast the new bound only on
    /// `Ok(true)`.
    pub fn update_last_nerx_for_federate(&mut self, federate: FederateHandle, time: FederationTime) -> Result<bool> {
        let _span = self.span.clone().entered();
        debug!(%federate, %time, "Federation::update_last_nerx_for_federate: called");
        let record = self.federate_mut(federate)?;
        record.set_last_nerx_value(time);
        record.set_using_nerx(true);

        let new_min = self.compute_min_nerx();
        if new_min <= self.min_nerx {
            return Ok(false);
        }

        info!(%new_min, "New NERx bound");
        self.min_nerx = new_min;
        for f in self.federates.values_mut().filter(|f| f.is_using_nerx()) {
            debug!(federate = %f.handle(), "Federation::update_last_nerx_for_federate: not NERing anymore");
            f.set_using_nerx(false);
        }
        Ok(true)
    }
}
