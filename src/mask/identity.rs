// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{MaskFuncEntry, MaskFuncMap, MaskKey};
use crate::datum::Datum;
use crate::types::FieldType;

use anyhow::Result;

pub fn register(m: &mut MaskFuncMap) {
    m.insert(
        "identity",
        MaskFuncEntry {
            name: "identity",
            description: "Keep every value as is. Useful for dry runs.",
            func: identity,
        },
    );
}

fn identity(d: &Datum, _tp: &FieldType, _key: &MaskKey) -> Result<(Datum, Option<FieldType>)> {
    Ok((d.clone(), None))
}
