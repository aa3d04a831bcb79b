// =============================================================================
// ATOMIC SWAP v0.1 - Transactions (UTXO Model)
// =============================================================================
//
// Legacy Bitcoin transaction format: consensus serialization, txids, and
// SIGHASH_ALL signature digests. Just enough of a ledger to build, sign and
// verify the swap transactions offline.
//
// =============================================================================

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwapError};
use crate::script::{hash256, Script, ScriptEngine, SignatureChecker};
use crate::{SEQUENCE_FINAL, SIGHASH_ALL, TX_VERSION};

// =============================================================================
// Transaction Identifier
// =============================================================================

/// Transaction id, stored in internal byte order and displayed reversed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Txid(pub [u8; 32]);

impl Txid {
    /// Parse the usual (byte-reversed) hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SwapError::validation(format!("Invalid txid hex: {}", e)))?;
        let mut id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SwapError::validation("Txid must be 32 bytes"))?;
        id.reverse();
        Ok(Txid(id))
    }

    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }
}

impl std::fmt::Display for Txid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Transaction output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Script,
}

/// Transaction input (reference to a previous output)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prev_txid: Txid,
    pub prev_index: u32,
    pub script_sig: Script,
    pub sequence: u32,
}

/// A spendable output owned by the caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: Txid,
    pub index: u32,
    pub value: u64,
    pub script_pubkey: Script,
}

impl UnspentOutput {
    /// Output `index` of an existing transaction
    pub fn from_tx(tx: &Tx, index: u32) -> Result<Self> {
        let output = tx
            .outputs
            .get(index as usize)
            .ok_or_else(|| SwapError::validation(format!("Transaction has no output {}", index)))?;
        Ok(UnspentOutput {
            txid: tx.txid(),
            index,
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
        })
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A full transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Default for Tx {
    fn default() -> Self {
        Tx::new()
    }
}

impl Tx {
    pub fn new() -> Self {
        Tx {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// Append an unsigned input; returns its index
    pub fn add_input(&mut self, prev_txid: Txid, prev_index: u32) -> usize {
        self.add_input_with_sequence(prev_txid, prev_index, SEQUENCE_FINAL)
    }

    pub fn add_input_with_sequence(&mut self, prev_txid: Txid, prev_index: u32, sequence: u32) -> usize {
        self.inputs.push(TxIn {
            prev_txid,
            prev_index,
            script_sig: Script::new(),
            sequence,
        });
        self.inputs.len() - 1
    }

    /// Append an output; returns its index
    pub fn add_output(&mut self, value: u64, script_pubkey: Script) -> usize {
        self.outputs.push(TxOut { value, script_pubkey });
        self.outputs.len() - 1
    }

    /// Total value of all outputs
    pub fn output_sum(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn txid(&self) -> Txid {
        Txid(hash256(&self.serialize()))
    }

    /// Legacy signature digest for `input_index` signed against `script_code`
    pub fn signature_hash(&self, input_index: usize, script_code: &Script, sighash_type: u32) -> Result<[u8; 32]> {
        if input_index >= self.inputs.len() {
            return Err(SwapError::validation("Input index out of bounds"));
        }

        let mut tx_copy = self.clone();
        for (i, input) in tx_copy.inputs.iter_mut().enumerate() {
            input.script_sig = if i == input_index {
                script_code.clone()
            } else {
                Script::new()
            };
        }

        let mut data = tx_copy.serialize();
        data.extend_from_slice(&sighash_type.to_le_bytes());
        Ok(hash256(&data))
    }

    /// Run the input's script-sig against the output it spends
    pub fn verify_input(&self, input_index: usize, previous: &UnspentOutput) -> Result<bool> {
        let input = self
            .inputs
            .get(input_index)
            .ok_or_else(|| SwapError::validation("Input index out of bounds"))?;

        if input.prev_txid != previous.txid || input.prev_index != previous.index {
            return Err(SwapError::validation(format!(
                "Input {} does not spend {}:{}",
                input_index, previous.txid, previous.index
            )));
        }

        self.verify_input_script(input_index, &previous.script_pubkey)
    }

    /// Run the input's script-sig against a known locking script
    pub fn verify_input_script(&self, input_index: usize, script_pubkey: &Script) -> Result<bool> {
        let input = self
            .inputs
            .get(input_index)
            .ok_or_else(|| SwapError::validation("Input index out of bounds"))?;

        let checker = TxSignatureChecker::new(self, input_index);
        let mut engine = ScriptEngine::new(&checker);
        engine.verify(&input.script_sig, script_pubkey)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.prev_txid.0);
            out.extend_from_slice(&input.prev_index.to_le_bytes());
            write_bytes(&mut out, &input.script_sig.to_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_bytes(&mut out, &output.script_pubkey.to_bytes());
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = i32::from_le_bytes(reader.array()?);

        let n_in = reader.varint()?;
        let mut inputs = Vec::new();
        for _ in 0..n_in {
            let prev_txid = Txid(reader.array()?);
            let prev_index = u32::from_le_bytes(reader.array()?);
            let script_sig = Script::from_bytes(reader.bytes()?)?;
            let sequence = u32::from_le_bytes(reader.array()?);
            inputs.push(TxIn { prev_txid, prev_index, script_sig, sequence });
        }

        let n_out = reader.varint()?;
        let mut outputs = Vec::new();
        for _ in 0..n_out {
            let value = u64::from_le_bytes(reader.array()?);
            let script_pubkey = Script::from_bytes(reader.bytes()?)?;
            outputs.push(TxOut { value, script_pubkey });
        }

        let lock_time = u32::from_le_bytes(reader.array()?);

        if !reader.is_empty() {
            return Err(SwapError::validation("Trailing bytes after transaction"));
        }

        Ok(Tx { version, inputs, outputs, lock_time })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SwapError::validation(format!("Invalid transaction hex: {}", e)))?;
        Self::deserialize(&bytes)
    }
}

// =============================================================================
// Signature Checking
// =============================================================================

/// Verifies ECDSA signatures over one input's legacy digest
pub struct TxSignatureChecker<'a> {
    tx: &'a Tx,
    input_index: usize,
}

impl<'a> TxSignatureChecker<'a> {
    pub fn new(tx: &'a Tx, input_index: usize) -> Self {
        TxSignatureChecker { tx, input_index }
    }
}

impl SignatureChecker for TxSignatureChecker<'_> {
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        let (sighash_byte, der) = match signature.split_last() {
            Some(parts) => parts,
            None => return false,
        };
        if *sighash_byte as u32 != SIGHASH_ALL {
            return false;
        }

        let digest = match self.tx.signature_hash(self.input_index, script_code, SIGHASH_ALL) {
            Ok(d) => d,
            Err(_) => return false,
        };
        verify_ecdsa(&digest, der, pubkey)
    }
}

/// Verify a DER signature (without sighash byte) over `digest`
pub fn verify_ecdsa(digest: &[u8; 32], der: &[u8], pubkey: &[u8]) -> bool {
    let secp = Secp256k1::verification_only();

    let pk = match PublicKey::from_slice(pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let sig = match Signature::from_der(der) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let message = Message::from_digest(*digest);
    secp.verify_ecdsa(&message, &sig, &pk).is_ok()
}

// =============================================================================
// Encoding Helpers
// =============================================================================

fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_varint(out, data.len() as u64);
    out.extend_from_slice(data);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SwapError::validation("Unexpected end of transaction data"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn varint(&mut self) -> Result<u64> {
        let [first] = self.array::<1>()?;
        Ok(match first {
            0xfd => u16::from_le_bytes(self.array()?) as u64,
            0xfe => u32::from_le_bytes(self.array()?) as u64,
            0xff => u64::from_le_bytes(self.array()?),
            n => n as u64,
        })
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| SwapError::validation("Length overflow"))?;
        self.take(len)
    }
}
