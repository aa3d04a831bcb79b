// =============================================================================
// ATOMIC SWAP v0.1 - Command Line
// =============================================================================
//
// Builds one side of a swap from local files and prints the payloads to hand
// to the counterparty as JSON on stdout. Nothing is broadcast.
//
// =============================================================================

use std::fs;
use std::process;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use atomic_swap::contract::ContractScript;
use atomic_swap::keys::{address_to_script, base58check_encode, KeyMaterial};
use atomic_swap::protocol::{CosignRequest, InitiatorOffer};
use atomic_swap::script::{OpCode, Script};
use atomic_swap::{format_coins, ChainParams, Result, SwapConfig, SwapError, SwapOrchestrator, Txid, UnspentOutput};

// =============================================================================
// CLI Definition
// =============================================================================

#[derive(Parser)]
#[command(name = "atomic-swap")]
#[command(version = "0.1.0")]
#[command(about = "Hash-lock atomic swap transaction builder", long_about = None)]
struct Cli {
    /// Chain preset: bitcoin, testnet, litecoin, dogecoin
    #[arg(long, global = true, default_value = "testnet")]
    chain: String,

    /// JSON file with fee and refund windows
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a swap: new secret, contract, funding and partial refund (48h)
    Initiate {
        /// File holding the WIF private key
        #[arg(short, long)]
        key_file: String,
        /// Counterparty public key (hex)
        #[arg(short, long)]
        recipient: String,
        /// Amount in base units
        #[arg(short, long)]
        amount: u64,
        /// JSON file listing spendable outputs
        #[arg(short, long)]
        utxos: String,
    },

    /// Mirror an initiator's deposit from its digest (24h refund)
    Respond {
        /// File holding the WIF private key
        #[arg(short, long)]
        key_file: String,
        /// Initiator public key (hex)
        #[arg(short, long)]
        initiator: String,
        /// Hash digest published by the initiator (hex)
        #[arg(short, long)]
        digest: String,
        /// Amount in base units
        #[arg(short, long)]
        amount: u64,
        /// JSON file listing spendable outputs
        #[arg(short, long)]
        utxos: String,
    },

    /// Cosign the counterparty's refund
    Cosign {
        /// File holding the WIF private key
        #[arg(short, long)]
        key_file: String,
        /// CosignRequest or InitiatorOffer JSON file
        #[arg(short, long)]
        request: String,
    },

    /// Disassemble a script, recognising swap contracts
    DecodeScript {
        /// Hex-encoded script, or an address of the selected chain
        input: String,
    },
}

/// One spendable output as listed in the UTXO file
#[derive(Deserialize)]
struct UtxoRecord {
    txid: String,
    vout: u32,
    value: u64,
    script_pubkey: String,
}

impl UtxoRecord {
    fn into_unspent(self) -> Result<UnspentOutput> {
        Ok(UnspentOutput {
            txid: Txid::from_hex(&self.txid)?,
            index: self.vout,
            value: self.value,
            script_pubkey: Script::from_hex(&self.script_pubkey)?,
        })
    }
}

#[derive(Serialize)]
struct InitiateOutput {
    contract_address: String,
    refund_address: String,
    refund_locktime: u32,
    /// Keep this secret until claiming
    preimage: String,
    offer: InitiatorOffer,
}

#[derive(Serialize)]
struct RespondOutput {
    contract_address: String,
    refund_address: String,
    refund_locktime: u32,
    funding_tx: String,
    contract_script: String,
    refund_tx: String,
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let chain = ChainParams::by_name(&cli.chain)?;
    let config = match &cli.config {
        Some(path) => SwapConfig::load(path)?,
        None => SwapConfig::default(),
    };

    match cli.command {
        Commands::Initiate { key_file, recipient, amount, utxos } => {
            cmd_initiate(&chain, config, &key_file, &recipient, amount, &utxos)
        }
        Commands::Respond { key_file, initiator, digest, amount, utxos } => {
            cmd_respond(&chain, config, &key_file, &initiator, &digest, amount, &utxos)
        }
        Commands::Cosign { key_file, request } => cmd_cosign(&chain, config, &key_file, &request),
        Commands::DecodeScript { input } => cmd_decode_script(&chain, &input),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_initiate(
    chain: &ChainParams,
    config: SwapConfig,
    key_file: &str,
    recipient: &str,
    amount: u64,
    utxos: &str,
) -> Result<()> {
    let key = load_key(key_file, chain)?;
    let utxos = load_utxos(utxos)?;
    let orchestrator = SwapOrchestrator::new(config)?;

    let session = orchestrator.initiate_swap(chain, &key, recipient, amount, &utxos)?;
    eprintln!(
        "Locking {} into {}",
        format_coins(session.amount()),
        session.contract_address()
    );

    print_json(&InitiateOutput {
        contract_address: session.contract_address(),
        refund_address: session.refund_address(),
        refund_locktime: session.refund().lock_time(),
        preimage: session.preimage_hex()?,
        offer: session.offer(),
    })
}

fn cmd_respond(
    chain: &ChainParams,
    config: SwapConfig,
    key_file: &str,
    initiator: &str,
    digest: &str,
    amount: u64,
    utxos: &str,
) -> Result<()> {
    let key = load_key(key_file, chain)?;
    let utxos = load_utxos(utxos)?;
    let orchestrator = SwapOrchestrator::new(config)?;

    let session = orchestrator.respond_swap(chain, &key, initiator, digest, amount, &utxos)?;
    eprintln!(
        "Locking {} into {}",
        format_coins(session.amount()),
        session.contract_address()
    );

    print_json(&RespondOutput {
        contract_address: session.contract_address(),
        refund_address: session.refund_address(),
        refund_locktime: session.refund().lock_time(),
        funding_tx: session.funding().to_hex(),
        contract_script: session.contract().to_hex(),
        refund_tx: session.refund().to_hex(),
    })
}

fn cmd_cosign(chain: &ChainParams, config: SwapConfig, key_file: &str, request: &str) -> Result<()> {
    let key = load_key(key_file, chain)?;
    let json = read_file(request)?;

    // An initiator's offer carries its refund too
    let request = match CosignRequest::from_json(&json) {
        Ok(request) => request,
        Err(_) => InitiatorOffer::from_json(&json)?.cosign_request(),
    };

    let response = SwapOrchestrator::new(config)?.cosign_counterparty_refund(&key, &request)?;
    print_json(&response)
}

fn cmd_decode_script(chain: &ChainParams, input: &str) -> Result<()> {
    // An address decodes to the script it locks with
    let script = match address_to_script(input, chain) {
        Ok(script) => script,
        Err(_) => Script::from_hex(input)?,
    };

    println!("  ASM:     {}", script.to_asm());
    println!("  Length:  {} bytes", script.to_bytes().len());

    if script.is_p2pkh() {
        println!("  Type:    P2PKH");
    } else if script.is_p2sh() {
        println!("  Type:    P2SH");
        if let Some(OpCode::OpPushData(hash)) = script.ops.get(1) {
            let mut versioned = vec![chain.script_address_version];
            versioned.extend_from_slice(hash);
            println!("  Address: {}", base58check_encode(&versioned));
        }
    } else if let Ok(contract) = ContractScript::from_bytes(&script.to_bytes()) {
        println!("  Type:      Swap contract");
        println!("  Depositor: {}", hex::encode(contract.depositor_pubkey()));
        println!("  Recipient: {}", hex::encode(contract.recipient_pubkey()));
        println!("  Digest:    {}", hex::encode(contract.digest()));
        println!("  Address:   {}", contract.p2sh_address(chain));
    } else {
        println!("  Type:    Non-standard");
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn read_file(path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| SwapError::Config(format!("Failed to read {}: {}", path, e)))
}

fn load_key(path: &str, chain: &ChainParams) -> Result<KeyMaterial> {
    KeyMaterial::from_wif(read_file(path)?.trim(), chain)
}

fn load_utxos(path: &str) -> Result<Vec<UnspentOutput>> {
    let records: Vec<UtxoRecord> = serde_json::from_str(&read_file(path)?)
        .map_err(|e| SwapError::Config(format!("Invalid UTXO file {}: {}", path, e)))?;
    records.into_iter().map(UtxoRecord::into_unspent).collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SwapError::Config(format!("Failed to encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
