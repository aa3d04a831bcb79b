// =============================================================================
// ATOMIC SWAP v0.1 - Script System (Bitcoin-style)
// =============================================================================
//
// Stack-based scripts as used by legacy Bitcoin outputs. Only the opcodes the
// swap contract and ordinary P2PKH/P2SH spends need are modelled.
//
// P2SH example:
//   scriptPubKey: OP_HASH160 <scriptHash> OP_EQUAL
//   scriptSig:    <args...> <serializedRedeemScript>
//
// =============================================================================

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::{Result, SwapError};

// =============================================================================
// Opcodes
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpCode {
    // Constants
    Op0,                    // Push empty byte array
    OpPushData(Vec<u8>),    // Push data onto stack
    Op1,                    // Push 1
    Op2,                    // Push 2
    Op3,                    // Push 3

    // Flow control
    OpIf,
    OpNotIf,
    OpElse,
    OpEndIf,
    OpVerify,               // Fail if top is false
    OpReturn,               // Mark as unspendable

    // Stack operations
    OpDup,
    OpDrop,

    // Bitwise logic
    OpEqual,
    OpEqualVerify,

    // Crypto
    OpSha256,
    OpHash160,              // SHA-256 then RIPEMD-160
    OpHash256,              // Double SHA-256
    OpCheckSig,
    OpCheckSigVerify,
    OpCheckMultiSig,
    OpCheckMultiSigVerify,

    // Anything else found while parsing
    OpUnknown(u8),
}

impl OpCode {
    /// Decode one opcode byte (push opcodes are handled by the parser)
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => OpCode::Op0,
            0x51 => OpCode::Op1,
            0x52 => OpCode::Op2,
            0x53 => OpCode::Op3,
            0x63 => OpCode::OpIf,
            0x64 => OpCode::OpNotIf,
            0x67 => OpCode::OpElse,
            0x68 => OpCode::OpEndIf,
            0x69 => OpCode::OpVerify,
            0x6a => OpCode::OpReturn,
            0x75 => OpCode::OpDrop,
            0x76 => OpCode::OpDup,
            0x87 => OpCode::OpEqual,
            0x88 => OpCode::OpEqualVerify,
            0xa8 => OpCode::OpSha256,
            0xa9 => OpCode::OpHash160,
            0xaa => OpCode::OpHash256,
            0xac => OpCode::OpCheckSig,
            0xad => OpCode::OpCheckSigVerify,
            0xae => OpCode::OpCheckMultiSig,
            0xaf => OpCode::OpCheckMultiSigVerify,
            other => OpCode::OpUnknown(other),
        }
    }

    /// Encode as a single byte
    pub fn to_byte(&self) -> u8 {
        match self {
            OpCode::Op0 => 0x00,
            OpCode::OpPushData(_) => 0x00, // Handled specially
            OpCode::Op1 => 0x51,
            OpCode::Op2 => 0x52,
            OpCode::Op3 => 0x53,
            OpCode::OpIf => 0x63,
            OpCode::OpNotIf => 0x64,
            OpCode::OpElse => 0x67,
            OpCode::OpEndIf => 0x68,
            OpCode::OpVerify => 0x69,
            OpCode::OpReturn => 0x6a,
            OpCode::OpDrop => 0x75,
            OpCode::OpDup => 0x76,
            OpCode::OpEqual => 0x87,
            OpCode::OpEqualVerify => 0x88,
            OpCode::OpSha256 => 0xa8,
            OpCode::OpHash160 => 0xa9,
            OpCode::OpHash256 => 0xaa,
            OpCode::OpCheckSig => 0xac,
            OpCode::OpCheckSigVerify => 0xad,
            OpCode::OpCheckMultiSig => 0xae,
            OpCode::OpCheckMultiSigVerify => 0xaf,
            OpCode::OpUnknown(b) => *b,
        }
    }

    fn name(&self) -> String {
        match self {
            OpCode::Op0 => "OP_0".to_string(),
            OpCode::OpPushData(data) => hex::encode(data),
            OpCode::Op1 => "OP_1".to_string(),
            OpCode::Op2 => "OP_2".to_string(),
            OpCode::Op3 => "OP_3".to_string(),
            OpCode::OpIf => "OP_IF".to_string(),
            OpCode::OpNotIf => "OP_NOTIF".to_string(),
            OpCode::OpElse => "OP_ELSE".to_string(),
            OpCode::OpEndIf => "OP_ENDIF".to_string(),
            OpCode::OpVerify => "OP_VERIFY".to_string(),
            OpCode::OpReturn => "OP_RETURN".to_string(),
            OpCode::OpDrop => "OP_DROP".to_string(),
            OpCode::OpDup => "OP_DUP".to_string(),
            OpCode::OpEqual => "OP_EQUAL".to_string(),
            OpCode::OpEqualVerify => "OP_EQUALVERIFY".to_string(),
            OpCode::OpSha256 => "OP_SHA256".to_string(),
            OpCode::OpHash160 => "OP_HASH160".to_string(),
            OpCode::OpHash256 => "OP_HASH256".to_string(),
            OpCode::OpCheckSig => "OP_CHECKSIG".to_string(),
            OpCode::OpCheckSigVerify => "OP_CHECKSIGVERIFY".to_string(),
            OpCode::OpCheckMultiSig => "OP_CHECKMULTISIG".to_string(),
            OpCode::OpCheckMultiSigVerify => "OP_CHECKMULTISIGVERIFY".to_string(),
            OpCode::OpUnknown(b) => format!("OP_UNKNOWN_{:02x}", b),
        }
    }
}

// =============================================================================
// Script
// =============================================================================

/// A script is a sequence of opcodes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    pub ops: Vec<OpCode>,
}

impl Script {
    pub fn new() -> Self {
        Script { ops: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parse raw script bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut script = Script::new();
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];

            if (0x01..=0x4b).contains(&b) {
                // Push data directly (1-75 bytes)
                let len = b as usize;
                if i + 1 + len > bytes.len() {
                    return Err(SwapError::validation("Invalid push data length"));
                }
                script.ops.push(OpCode::OpPushData(bytes[i + 1..i + 1 + len].to_vec()));
                i += 1 + len;
            } else if b == 0x4c {
                // OP_PUSHDATA1: next byte is length
                if i + 1 >= bytes.len() {
                    return Err(SwapError::validation("Missing PUSHDATA1 length"));
                }
                let len = bytes[i + 1] as usize;
                if i + 2 + len > bytes.len() {
                    return Err(SwapError::validation("Invalid PUSHDATA1 length"));
                }
                script.ops.push(OpCode::OpPushData(bytes[i + 2..i + 2 + len].to_vec()));
                i += 2 + len;
            } else if b == 0x4d {
                // OP_PUSHDATA2: next 2 bytes are length (little endian)
                if i + 2 >= bytes.len() {
                    return Err(SwapError::validation("Missing PUSHDATA2 length"));
                }
                let len = u16::from_le_bytes([bytes[i + 1], bytes[i + 2]]) as usize;
                if i + 3 + len > bytes.len() {
                    return Err(SwapError::validation("Invalid PUSHDATA2 length"));
                }
                script.ops.push(OpCode::OpPushData(bytes[i + 3..i + 3 + len].to_vec()));
                i += 3 + len;
            } else {
                script.ops.push(OpCode::from_byte(b));
                i += 1;
            }
        }

        Ok(script)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SwapError::validation(format!("Invalid script hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Serialize to raw script bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        for op in &self.ops {
            match op {
                OpCode::OpPushData(data) => {
                    let len = data.len();
                    if len <= 75 {
                        bytes.push(len as u8);
                    } else if len <= 255 {
                        bytes.push(0x4c);
                        bytes.push(len as u8);
                    } else {
                        bytes.push(0x4d);
                        bytes.extend(&(len as u16).to_le_bytes());
                    }
                    bytes.extend(data);
                }
                _ => bytes.push(op.to_byte()),
            }
        }

        bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Human readable disassembly
    pub fn to_asm(&self) -> String {
        self.ops.iter().map(OpCode::name).collect::<Vec<_>>().join(" ")
    }

    /// OP_DUP OP_HASH160 <pubKeyHash> OP_EQUALVERIFY OP_CHECKSIG
    pub fn p2pkh(pubkey_hash: &[u8]) -> Self {
        Script {
            ops: vec![
                OpCode::OpDup,
                OpCode::OpHash160,
                OpCode::OpPushData(pubkey_hash.to_vec()),
                OpCode::OpEqualVerify,
                OpCode::OpCheckSig,
            ],
        }
    }

    /// <signature> <pubKey>
    pub fn p2pkh_sig(signature: &[u8], pubkey: &[u8]) -> Self {
        Script {
            ops: vec![
                OpCode::OpPushData(signature.to_vec()),
                OpCode::OpPushData(pubkey.to_vec()),
            ],
        }
    }

    /// OP_HASH160 <scriptHash> OP_EQUAL
    pub fn p2sh(script_hash: &[u8]) -> Self {
        Script {
            ops: vec![
                OpCode::OpHash160,
                OpCode::OpPushData(script_hash.to_vec()),
                OpCode::OpEqual,
            ],
        }
    }

    pub fn is_p2pkh(&self) -> bool {
        self.ops.len() == 5
            && self.ops[0] == OpCode::OpDup
            && self.ops[1] == OpCode::OpHash160
            && matches!(&self.ops[2], OpCode::OpPushData(d) if d.len() == 20)
            && self.ops[3] == OpCode::OpEqualVerify
            && self.ops[4] == OpCode::OpCheckSig
    }

    pub fn is_p2sh(&self) -> bool {
        self.ops.len() == 3
            && self.ops[0] == OpCode::OpHash160
            && matches!(&self.ops[1], OpCode::OpPushData(d) if d.len() == 20)
            && self.ops[2] == OpCode::OpEqual
    }

    /// Script-sigs may only push data
    pub fn is_push_only(&self) -> bool {
        self.ops.iter().all(|op| {
            matches!(op, OpCode::Op0 | OpCode::Op1 | OpCode::Op2 | OpCode::Op3 | OpCode::OpPushData(_))
        })
    }
}

// =============================================================================
// Script Execution Engine
// =============================================================================

/// Source of signature digests for the input being verified
pub trait SignatureChecker {
    /// `script_code` is the script currently executing (the locking script
    /// for direct spends, the redeem script for P2SH spends).
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &Script) -> bool;
}

/// Script interpreter
pub struct ScriptEngine<'a> {
    stack: Vec<Vec<u8>>,
    checker: &'a dyn SignatureChecker,
}

impl<'a> ScriptEngine<'a> {
    pub fn new(checker: &'a dyn SignatureChecker) -> Self {
        ScriptEngine {
            stack: Vec::new(),
            checker,
        }
    }

    /// Run scriptSig + scriptPubKey (and the redeem script for P2SH)
    pub fn verify(&mut self, script_sig: &Script, script_pubkey: &Script) -> Result<bool> {
        if !script_sig.is_push_only() {
            return Err(SwapError::validation("scriptSig is not push-only"));
        }

        self.execute(script_sig)?;

        // Keep the stack for P2SH
        let stack_copy = self.stack.clone();

        self.execute(script_pubkey)?;

        match self.stack.pop() {
            Some(top) if Self::is_true(&top) => {}
            _ => return Ok(false),
        }

        if script_pubkey.is_p2sh() {
            let (serialized, rest) = match stack_copy.split_last() {
                Some(parts) => parts,
                None => return Ok(false),
            };
            let redeem_script = Script::from_bytes(serialized)?;

            self.stack = rest.to_vec();
            self.execute(&redeem_script)?;

            return Ok(matches!(self.stack.pop(), Some(top) if Self::is_true(&top)));
        }

        Ok(true)
    }

    /// Run one script
    pub fn execute(&mut self, script: &Script) -> Result<()> {
        let mut if_stack: Vec<bool> = Vec::new();

        for op in &script.ops {
            let executing = if_stack.iter().all(|&b| b);

            match op {
                // Control flow (always process)
                OpCode::OpIf | OpCode::OpNotIf => {
                    if executing {
                        let val = Self::is_true(&self.pop()?);
                        if_stack.push(if *op == OpCode::OpIf { val } else { !val });
                    } else {
                        if_stack.push(false);
                    }
                }
                OpCode::OpElse => match if_stack.last_mut() {
                    Some(last) => *last = !*last,
                    None => return Err(SwapError::validation("OP_ELSE without OP_IF")),
                },
                OpCode::OpEndIf => {
                    if if_stack.pop().is_none() {
                        return Err(SwapError::validation("OP_ENDIF without OP_IF"));
                    }
                }

                // Skip if not executing
                _ if !executing => continue,

                OpCode::Op0 => self.stack.push(vec![]),
                OpCode::Op1 => self.stack.push(vec![1]),
                OpCode::Op2 => self.stack.push(vec![2]),
                OpCode::Op3 => self.stack.push(vec![3]),
                OpCode::OpPushData(data) => self.stack.push(data.clone()),

                OpCode::OpVerify => {
                    if !Self::is_true(&self.pop()?) {
                        return Err(SwapError::validation("OP_VERIFY failed"));
                    }
                }
                OpCode::OpReturn => {
                    return Err(SwapError::validation("OP_RETURN: script is unspendable"));
                }

                OpCode::OpDup => {
                    let top = self.peek()?;
                    self.stack.push(top);
                }
                OpCode::OpDrop => {
                    self.pop()?;
                }

                OpCode::OpEqual => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.stack.push(if a == b { vec![1] } else { vec![] });
                }
                OpCode::OpEqualVerify => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    if a != b {
                        return Err(SwapError::validation("OP_EQUALVERIFY failed"));
                    }
                }

                OpCode::OpSha256 => {
                    let data = self.pop()?;
                    self.stack.push(Sha256::digest(&data).to_vec());
                }
                OpCode::OpHash160 => {
                    let data = self.pop()?;
                    self.stack.push(hash160(&data).to_vec());
                }
                OpCode::OpHash256 => {
                    let data = self.pop()?;
                    self.stack.push(hash256(&data).to_vec());
                }
                OpCode::OpCheckSig | OpCode::OpCheckSigVerify => {
                    let pubkey = self.pop()?;
                    let sig = self.pop()?;
                    let valid = self.checker.check_sig(&sig, &pubkey, script);
                    if *op == OpCode::OpCheckSigVerify {
                        if !valid {
                            return Err(SwapError::validation("OP_CHECKSIGVERIFY failed"));
                        }
                    } else {
                        self.stack.push(if valid { vec![1] } else { vec![] });
                    }
                }
                OpCode::OpCheckMultiSig | OpCode::OpCheckMultiSigVerify => {
                    let n = self.pop_small()?;
                    let mut pubkeys = Vec::with_capacity(n);
                    for _ in 0..n {
                        pubkeys.push(self.pop()?);
                    }

                    let m = self.pop_small()?;
                    if m > n {
                        return Err(SwapError::validation("More signatures than keys"));
                    }
                    let mut sigs = Vec::with_capacity(m);
                    for _ in 0..m {
                        sigs.push(self.pop()?);
                    }

                    // Dummy element (Bitcoin off-by-one)
                    self.pop()?;

                    // Popped in reverse; restore script order
                    pubkeys.reverse();
                    sigs.reverse();

                    let valid = self.verify_multisig(&sigs, &pubkeys, script);
                    if *op == OpCode::OpCheckMultiSigVerify {
                        if !valid {
                            return Err(SwapError::validation("OP_CHECKMULTISIGVERIFY failed"));
                        }
                    } else {
                        self.stack.push(if valid { vec![1] } else { vec![] });
                    }
                }

                OpCode::OpUnknown(b) => {
                    return Err(SwapError::validation(format!("Unsupported opcode 0x{:02x}", b)));
                }
            }
        }

        if !if_stack.is_empty() {
            return Err(SwapError::validation("Unbalanced conditional"));
        }

        Ok(())
    }

    fn pop(&mut self) -> Result<Vec<u8>> {
        self.stack.pop().ok_or_else(|| SwapError::validation("Stack underflow"))
    }

    fn peek(&self) -> Result<Vec<u8>> {
        self.stack.last().cloned().ok_or_else(|| SwapError::validation("Stack underflow"))
    }

    fn pop_small(&mut self) -> Result<usize> {
        let data = self.pop()?;
        match data.as_slice() {
            [] => Ok(0),
            [n] if *n <= 20 => Ok(*n as usize),
            _ => Err(SwapError::validation("Invalid key or signature count")),
        }
    }

    fn is_true(data: &[u8]) -> bool {
        for (i, &byte) in data.iter().enumerate() {
            if byte != 0 {
                // Negative zero
                if i == data.len() - 1 && byte == 0x80 {
                    return false;
                }
                return true;
            }
        }
        false
    }

    /// Signatures must match keys in order; each key is tried at most once.
    fn verify_multisig(&self, sigs: &[Vec<u8>], pubkeys: &[Vec<u8>], script: &Script) -> bool {
        let mut sig_idx = 0;
        let mut pk_idx = 0;

        while sig_idx < sigs.len() && pk_idx < pubkeys.len() {
            if self.checker.check_sig(&sigs[sig_idx], &pubkeys[pk_idx], script) {
                sig_idx += 1;
            }
            pk_idx += 1;
        }

        sig_idx == sigs.len()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// HASH160 (SHA256 + RIPEMD160)
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// HASH256 (double SHA256)
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}
