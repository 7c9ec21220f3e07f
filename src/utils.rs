//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const TRANSACTION_HRP: &str = "txn";
pub const USER_HRP: &str = "user";

/// A fresh uuid7, bech32m-encoded under the given human readable prefix.
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

pub fn new_transaction_id() -> anyhow::Result<String> {
    new_uuid_to_bech32(TRANSACTION_HRP)
}

pub fn new_user_id() -> anyhow::Result<String> {
    new_uuid_to_bech32(USER_HRP)
}
