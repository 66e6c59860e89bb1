// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{MaskFuncEntry, MaskFuncMap, MaskKey};
use crate::datum::Datum;
use crate::types::{FieldType, TypeCode};

use anyhow::Result;

pub fn register(m: &mut MaskFuncMap) {
    m.insert(
        "debug",
        MaskFuncEntry {
            name: "debug",
            description: "Replace each value with a string describing its inferred type and value.",
            func: debug,
        },
    );
}

fn debug(d: &Datum, tp: &FieldType, _key: &MaskKey) -> Result<(Datum, Option<FieldType>)> {
    let tp_text = tp.to_string();
    let tp_desc = tp_text.split(' ').next().unwrap_or_default();
    let info = format!("{tp_desc} {}", d.to_text());
    Ok((Datum::String(info), Some(FieldType::new(TypeCode::Varchar))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_type_and_value() -> Result<()> {
        let key = MaskKey::derive("k");
        let tp = FieldType::new(TypeCode::Long).unsigned();
        let (d, new_tp) = debug(&Datum::Uint(7), &tp, &key)?;
        assert_eq!(d, Datum::String("int(11) 7".into()));
        assert_eq!(new_tp.map(|t| t.tp), Some(TypeCode::Varchar));
        Ok(())
    }
}
