//! Standard script templates
//!
//! A template is human-readable script text with `<name>` placeholders.
//! Filling a template substitutes push literals for the placeholders;
//! recognition goes the other way and pulls the literals back out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ChainParamsError, Result};
use crate::opcode_table::OpcodeTable;
use crate::script::Script;

/// What a placeholder accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    /// Base58Check address or a 20-byte hash in hex
    Address,
    /// Arbitrary text, pushed as its UTF-8 bytes
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    pub name: String,
    pub text: String,
    pub variables: BTreeMap<String, VariableKind>,
}

pub fn known_templates() -> Vec<ScriptTemplate> {
    vec![
        ScriptTemplate::new(
            "Pay-To-Public-Key-Hash Output",
            "OP_DUP OP_HASH160 <recipient> OP_EQUALVERIFY OP_CHECKSIG",
            &[("recipient", VariableKind::Address)],
        ),
        ScriptTemplate::new(
            "Pay-To-Script-Hash Output",
            "OP_HASH160 <recipient> OP_EQUAL",
            &[("recipient", VariableKind::Address)],
        ),
        ScriptTemplate::new("Null Output", "OP_RETURN <text>", &[("text", VariableKind::Text)]),
    ]
}

fn placeholder(token: &str) -> Option<&str> {
    token.strip_prefix('<')?.strip_suffix('>')
}

/// 20-byte hash from a Base58Check address or a 40-digit hex string
fn decode_address(value: &str) -> Option<Vec<u8>> {
    if let Ok(decoded) = bs58::decode(value).with_check(None).into_vec() {
        // version byte followed by the hash
        if decoded.len() == 21 {
            return Some(decoded[1..].to_vec());
        }
    }
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.len() != 40 {
        return None;
    }
    hex::decode(digits).ok()
}

fn is_valid_value(token: &str, kind: VariableKind) -> bool {
    let digits = match token.strip_prefix("0x") {
        Some(digits) => digits,
        None => return false,
    };
    match kind {
        VariableKind::Address => digits.len() == 40 && hex::decode(digits).is_ok(),
        VariableKind::Text => hex::decode(digits).is_ok(),
    }
}

impl ScriptTemplate {
    pub fn new(name: &str, text: &str, variables: &[(&str, VariableKind)]) -> Self {
        ScriptTemplate {
            name: name.to_string(),
            text: text.to_string(),
            variables: variables.iter().map(|(n, k)| (n.to_string(), *k)).collect(),
        }
    }

    /// Substitute `values` for the placeholders, producing human-readable text
    pub fn fill(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let mut tokens = Vec::new();
        for token in self.text.split_whitespace() {
            let var = match placeholder(token) {
                Some(var) => var,
                None => {
                    tokens.push(token.to_string());
                    continue;
                }
            };
            let kind = self.variables.get(var).ok_or_else(|| {
                ChainParamsError::Template(format!("template '{}' has no variable <{}>", self.name, var))
            })?;
            let value = values
                .get(var)
                .ok_or_else(|| ChainParamsError::Template(format!("missing value for <{}>", var)))?;
            let literal = match kind {
                VariableKind::Address => {
                    let hash = decode_address(value).ok_or_else(|| {
                        ChainParamsError::Template(format!("could not decode <{}> address", var))
                    })?;
                    format!("0x{}", hex::encode(hash))
                }
                VariableKind::Text => format!("0x{}", hex::encode(value.as_bytes())),
            };
            tokens.push(literal);
        }
        Ok(tokens.join(" "))
    }

    /// Fill the template and parse the result with `table`
    pub fn to_script(&self, values: &BTreeMap<String, String>, table: &OpcodeTable) -> Result<Script> {
        Script::from_human(&self.fill(values)?, table)
    }

    /// Pull the placeholder values out of `script` if it follows this template
    pub fn extract(&self, script: &Script, table: &OpcodeTable) -> Option<TemplateMatch> {
        let human = script.to_human(table).ok()?;
        let actual: Vec<&str> = human.split_whitespace().collect();
        let expected: Vec<&str> = self.text.split_whitespace().collect();
        if actual.len() != expected.len() {
            return None;
        }

        let mut variables = BTreeMap::new();
        for (have, want) in actual.iter().zip(&expected) {
            match placeholder(want) {
                Some(var) => {
                    let kind = *self.variables.get(var)?;
                    if !is_valid_value(have, kind) {
                        return None;
                    }
                    variables.insert(var.to_string(), have.to_string());
                }
                None if have != want => return None,
                None => {}
            }
        }

        if self.variables.keys().any(|k| !variables.contains_key(k)) {
            return None;
        }
        Some(TemplateMatch { template: self.clone(), variables })
    }

    pub fn matches(&self, script: &Script, table: &OpcodeTable) -> bool {
        self.extract(script, table).is_some()
    }
}

/// A script recognized as an instance of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    pub template: ScriptTemplate,
    /// Placeholder name → push literal (`0x...`)
    pub variables: BTreeMap<String, String>,
}

impl TemplateMatch {
    pub fn recipient(&self) -> Option<&str> {
        self.variables.get("recipient").map(String::as_str)
    }
}

/// First template in `templates` that `script` follows
pub fn recognize(
    script: &Script,
    templates: &[ScriptTemplate],
    table: &OpcodeTable,
) -> Option<TemplateMatch> {
    templates.iter().find_map(|t| t.extract(script, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_fill_with_base58_address() {
        let p2pkh = &known_templates()[0];
        // Bitcoin genesis coinbase address
        let text = p2pkh
            .fill(&values(&[("recipient", "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")]))
            .unwrap();
        assert_eq!(
            text,
            "OP_DUP OP_HASH160 0x62e907b15cbf27d5425399ebf6f0fb50ebb88f18 OP_EQUALVERIFY OP_CHECKSIG"
        );
    }

    #[test]
    fn test_fill_with_hex_hash() {
        let p2sh = &known_templates()[1];
        let hash = "0x00112233445566778899aabbccddeeff00112233";
        assert_eq!(
            p2sh.fill(&values(&[("recipient", hash)])).unwrap(),
            format!("OP_HASH160 {} OP_EQUAL", hash)
        );
        assert_eq!(
            p2sh.fill(&values(&[("recipient", &hash[2..])])).unwrap(),
            format!("OP_HASH160 {} OP_EQUAL", hash)
        );
    }

    #[test]
    fn test_fill_errors() {
        let p2pkh = &known_templates()[0];
        assert!(matches!(
            p2pkh.fill(&values(&[("recipient", "nope")])),
            Err(ChainParamsError::Template(_))
        ));
        assert!(matches!(p2pkh.fill(&BTreeMap::new()), Err(ChainParamsError::Template(_))));
    }

    #[test]
    fn test_null_data_roundtrip() {
        let table = OpcodeTable::base();
        let null = &known_templates()[2];
        let script = null.to_script(&values(&[("text", "hi")]), &table).unwrap();
        assert_eq!(script.to_hex(), "6a026869");
        let found = recognize(&script, &known_templates(), &table).unwrap();
        assert_eq!(found.template.name, "Null Output");
        assert_eq!(found.variables.get("text").map(String::as_str), Some("0x6869"));
        assert_eq!(found.recipient(), None);
    }

    #[test]
    fn test_wrong_hash_length_not_recognized() {
        let table = OpcodeTable::base();
        let script = Script::from_human("OP_HASH160 0xaabb OP_EQUAL", &table).unwrap();
        assert!(recognize(&script, &known_templates(), &table).is_none());
    }
}
