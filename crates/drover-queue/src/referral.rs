//! Referral codes harvested from registered accounts.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{QueueError, Store};

/// An account's own referral code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub owner: String,
    pub code: String,
    pub used: bool,
}

impl Store {
    /// Pick a referral code for `address` to register with, or `""` for none.
    ///
    /// Wallets that already own a code never get one. Otherwise, with the
    /// configured chance, the first unused code is consumed; when every code
    /// has been used once, a random one is reused.
    pub async fn referral_lookup(&self, address: &str) -> Result<String, QueueError> {
        let _guard = self.lock().await;
        let mut records = self.read_referrals().await?;

        let chance = self.options().referral_chance;
        let code = match pick_referral(&mut records, address, chance) {
            Some((code, consumed)) => {
                if consumed {
                    self.write_referrals(&records).await?;
                }
                code
            }
            None => String::new(),
        };

        debug!(address, code = %code, "referral lookup");
        Ok(code)
    }

    /// Remember `address`'s own code. Ignored when the wallet already has one.
    pub async fn referral_record(&self, address: &str, code: &str) -> Result<(), QueueError> {
        let _guard = self.lock().await;
        let mut records = self.read_referrals().await?;

        if records.iter().any(|r| r.owner == address) {
            return Ok(());
        }
        records.push(ReferralRecord {
            owner: address.to_string(),
            code: code.to_string(),
            used: false,
        });
        self.write_referrals(&records).await
    }
}

/// Returns the chosen code and whether an unused record was consumed.
fn pick_referral(
    records: &mut [ReferralRecord],
    address: &str,
    chance: u8,
) -> Option<(String, bool)> {
    if records.is_empty() || records.iter().any(|r| r.owner == address) {
        return None;
    }

    let mut rng = rand::thread_rng();
    if rng.gen_range(1..=100u8) > chance {
        return None;
    }

    if let Some(record) = records.iter_mut().find(|r| !r.used) {
        record.used = true;
        return Some((record.code.clone(), true));
    }
    records.choose(&mut rng).map(|r| (r.code.clone(), false))
}
