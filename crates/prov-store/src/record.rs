use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::traits::Transaction;

/// An opaque record body as held by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredRecord {
    pub body: serde_json::Value,
}

impl StoredRecord {
    pub fn encode<T: Serialize>(value: &T) -> StoreResult<Self> {
        Ok(Self {
            body: serde_json::to_value(value)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(T::deserialize(&self.body)?)
    }
}

/// A typed record stored under a fixed kind.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// Typed access on top of [`Transaction`].
pub trait TransactionExt: Transaction {
    fn get<R: Record>(&mut self, id: &str) -> StoreResult<Option<R>> {
        self.read(R::KIND, id)?
            .map(|stored| stored.decode())
            .transpose()
    }

    fn put<R: Record>(&mut self, id: &str, record: &R) -> StoreResult<()> {
        let stored = StoredRecord::encode(record)?;
        self.write(R::KIND, id, stored)
    }

    fn scan_all<R: Record>(&mut self) -> StoreResult<Vec<(String, R)>> {
        self.scan(R::KIND)?
            .into_iter()
            .map(|(id, stored)| Ok((id, stored.decode()?)))
            .collect()
    }
}

impl<T: Transaction> TransactionExt for T {}
