// =============================================================================
// ATOMIC SWAP v0.1 - Swap Orchestration
// =============================================================================
//
// Sequences contract, funding and refund construction for each side:
//
//   Initiator (chain 1)               Responder (chain 2)
//   -------------------               -------------------
//   x <- 32 random bytes
//   H = SHA256(SHA256(x))
//   contract(A, B, H)
//   fund contract with amount
//   refund, locked 48h        ---->   contract(B, A, H)  (sees H only)
//                                     fund contract with amount
//                             <----   refund, locked 24h
//   cosign B's refund         <--->   cosign A's refund
//
// The responder's window is shorter so it can always get its coins back
// before the initiator could refund and still hold x.
//
// =============================================================================

use std::fmt;

use crate::chain::ChainParams;
use crate::config::SwapConfig;
use crate::contract::ContractScript;
use crate::cosign::CounterpartyCosigner;
use crate::error::{Result, SwapError};
use crate::funding::{FundingTransaction, FundingTransactionAssembler};
use crate::hashlock::{parse_digest, HashLock, Preimage};
use crate::keys::{parse_pubkey, pubkey_to_address, KeyMaterial};
use crate::protocol::{CosignRequest, CosignResponse, InitiatorOffer};
use crate::refund::{unix_now, RefundTransaction, RefundTransactionBuilder};
use crate::selection::{CoinSelector, GreedyFirstFit};
use crate::transaction::{Tx, UnspentOutput};
use crate::HASH_SIZE;

// =============================================================================
// Session
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapRole {
    /// Chose the secret, funds first, waits longest
    Initiator,
    /// Mirrors the deposit knowing only the digest
    Responder,
}

impl fmt::Display for SwapRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapRole::Initiator => write!(f, "initiator"),
            SwapRole::Responder => write!(f, "responder"),
        }
    }
}

/// One side of a swap: everything it built on its own chain
#[derive(Clone, Debug)]
pub struct SwapSession {
    role: SwapRole,
    chain: ChainParams,
    digest: [u8; HASH_SIZE],
    preimage: Option<Preimage>,
    contract: ContractScript,
    funding: FundingTransaction,
    refund: RefundTransaction,
    created_at: u64,
}

impl SwapSession {
    pub fn role(&self) -> SwapRole {
        self.role
    }

    pub fn chain(&self) -> &ChainParams {
        &self.chain
    }

    pub fn digest(&self) -> &[u8; HASH_SIZE] {
        &self.digest
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn contract(&self) -> &ContractScript {
        &self.contract
    }

    pub fn funding(&self) -> &FundingTransaction {
        &self.funding
    }

    pub fn refund(&self) -> &RefundTransaction {
        &self.refund
    }

    pub fn amount(&self) -> u64 {
        self.funding.amount()
    }

    /// Unix time the session was opened
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Address the funding transaction pays into
    pub fn contract_address(&self) -> String {
        self.contract.p2sh_address(&self.chain)
    }

    /// Depositor address on this session's chain, where the refund pays
    pub fn refund_address(&self) -> String {
        pubkey_to_address(self.contract.depositor_pubkey(), &self.chain)
    }

    /// The secret behind the digest. Only the initiator has one, and handing
    /// it out before claiming gives the counterparty both sides of the swap.
    pub fn reveal_preimage(&self) -> Result<&Preimage> {
        match (&self.role, &self.preimage) {
            (SwapRole::Initiator, Some(preimage)) => {
                log::warn!("Preimage of swap {} revealed", self.digest_hex());
                Ok(preimage)
            }
            _ => Err(SwapError::validation("Only the initiator holds the preimage")),
        }
    }

    pub fn preimage_hex(&self) -> Result<String> {
        self.reveal_preimage().map(Preimage::reveal_hex)
    }

    /// Payload sent to the responder; never carries the preimage
    pub fn offer(&self) -> InitiatorOffer {
        InitiatorOffer {
            funding_tx: self.funding.to_hex(),
            contract_script: self.contract.to_hex(),
            hash_digest: self.digest_hex(),
            refund_tx: self.refund.to_hex(),
        }
    }

    /// Ask the counterparty to cosign this session's refund
    pub fn cosign_request(&self) -> CosignRequest {
        CosignRequest::new(&self.refund, &self.contract)
    }

    /// Install the counterparty-cosigned refund in place of the partial one
    pub fn accept_cosigned_refund(&mut self, response: &CosignResponse) -> Result<()> {
        let cosigned = response.decode(&self.contract)?;
        if !cosigned.is_final() {
            return Err(SwapError::validation("Returned refund is not fully signed"));
        }

        // Only the script-sig may differ from what we signed
        let ours = self.refund.tx();
        let theirs = cosigned.tx();
        let same_outpoint = theirs.inputs.len() == 1
            && theirs.inputs[0].prev_txid == ours.inputs[0].prev_txid
            && theirs.inputs[0].prev_index == ours.inputs[0].prev_index
            && theirs.inputs[0].sequence == ours.inputs[0].sequence;
        if !same_outpoint || theirs.outputs != ours.outputs || theirs.lock_time != ours.lock_time {
            return Err(SwapError::validation("Returned refund differs from the one sent"));
        }
        if !cosigned.verify(&self.contract)? {
            return Err(SwapError::signature("Returned refund does not satisfy the contract"));
        }

        log::info!("{} refund {} is now final", self.role, cosigned.txid());
        self.refund = cosigned;
        Ok(())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Builds swap sessions for either role
pub struct SwapOrchestrator {
    config: SwapConfig,
    selector: Box<dyn CoinSelector + Send + Sync>,
}

impl SwapOrchestrator {
    pub fn new(config: SwapConfig) -> Result<Self> {
        config.validate()?;
        Ok(SwapOrchestrator {
            config,
            selector: Box::new(GreedyFirstFit),
        })
    }

    pub fn with_selector(mut self, selector: impl CoinSelector + Send + Sync + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// Start a swap: new secret, contract to `recipient_pubkey_hex`, funding
    /// and a partially signed refund locked for the initiator window.
    pub fn initiate_swap(
        &self,
        chain: &ChainParams,
        key: &KeyMaterial,
        recipient_pubkey_hex: &str,
        amount: u64,
        utxos: &[UnspentOutput],
    ) -> Result<SwapSession> {
        let recipient = parse_pubkey(recipient_pubkey_hex)?;
        let (preimage, digest) = HashLock::generate().into_parts();

        self.open_session(
            SwapRole::Initiator,
            chain,
            key,
            &recipient,
            digest,
            Some(preimage),
            amount,
            utxos,
            self.config.initiator_refund_hours,
        )
    }

    /// Mirror the initiator's deposit using only its digest
    pub fn respond_swap(
        &self,
        chain: &ChainParams,
        key: &KeyMaterial,
        initiator_pubkey_hex: &str,
        digest_hex: &str,
        amount: u64,
        utxos: &[UnspentOutput],
    ) -> Result<SwapSession> {
        let initiator = parse_pubkey(initiator_pubkey_hex)?;
        let digest = parse_digest(digest_hex)?;

        self.open_session(
            SwapRole::Responder,
            chain,
            key,
            &initiator,
            digest,
            None,
            amount,
            utxos,
            self.config.responder_refund_hours,
        )
    }

    /// `respond_swap` driven by a received offer. The offered contract must
    /// name `key` as its recipient, and the offered funding must pay into it.
    pub fn respond_to_offer(
        &self,
        chain: &ChainParams,
        key: &KeyMaterial,
        offer: &InitiatorOffer,
        amount: u64,
        utxos: &[UnspentOutput],
    ) -> Result<SwapSession> {
        let contract = offer.contract()?;
        if contract.recipient_pubkey() != key.public_key_bytes().as_slice() {
            return Err(SwapError::validation("Offer is not addressed to this key"));
        }
        let funding = offer.funding()?;
        let deposit = funding
            .outputs
            .first()
            .ok_or_else(|| SwapError::validation("Offered funding has no outputs"))?;
        if deposit.script_pubkey != contract.locking_script() {
            return Err(SwapError::validation("Offered funding does not pay into the offered contract"));
        }
        let digest = offer.digest()?;

        log::debug!(
            "Offer funds {} into {} ({})",
            deposit.value,
            contract.p2sh_address(chain),
            funding.txid()
        );

        self.open_session(
            SwapRole::Responder,
            chain,
            key,
            contract.depositor_pubkey(),
            digest,
            None,
            amount,
            utxos,
            self.config.responder_refund_hours,
        )
    }

    /// Cosign the refund the other party built on its own chain
    pub fn cosign_counterparty_refund(&self, key: &KeyMaterial, request: &CosignRequest) -> Result<CosignResponse> {
        let (refund, contract) = request.decode()?;
        let cosigned = CounterpartyCosigner::new().cosign(key, &refund, &contract)?;
        Ok(CosignResponse::new(&cosigned))
    }

    /// Spend a contract through the hash-lock branch.
    ///
    /// Not supported: there is no rule yet for a claim racing the
    /// counterparty's refund once its locktime has passed.
    pub fn claim_swap(&self, _session: &SwapSession, _key: &KeyMaterial, _preimage: &Preimage) -> Result<Tx> {
        Err(SwapError::ClaimUnimplemented)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_session(
        &self,
        role: SwapRole,
        chain: &ChainParams,
        key: &KeyMaterial,
        counterparty: &[u8],
        digest: [u8; HASH_SIZE],
        preimage: Option<Preimage>,
        amount: u64,
        utxos: &[UnspentOutput],
        lock_hours: u32,
    ) -> Result<SwapSession> {
        // Addresses in logs and on the session follow the swap's chain
        let key = &key.for_chain(chain);
        let contract = ContractScript::build(&key.public_key_bytes(), counterparty, &digest)?;

        let funding = FundingTransactionAssembler::new(self.config.fee, self.selector.as_ref())
            .build(key, amount, utxos, &contract)?;

        let created_at = unix_now();
        let refund = RefundTransactionBuilder::new(self.config.fee)
            .build_at(key, amount, &funding, &contract, lock_hours, created_at)?;

        log::info!(
            "{} session on {}: contract {}, funding {}, refund to {} after locktime {}",
            role,
            chain,
            contract.p2sh_address(chain),
            funding.txid(),
            key.address(),
            refund.lock_time()
        );

        Ok(SwapSession {
            role,
            chain: chain.clone(),
            digest,
            preimage,
            contract,
            funding,
            refund,
            created_at,
        })
    }
}

impl Default for SwapOrchestrator {
    fn default() -> Self {
        SwapOrchestrator {
            config: SwapConfig::default(),
            selector: Box::new(GreedyFirstFit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashlock::verify_preimage;
    use crate::transaction::Txid;
    use crate::{COIN, DEFAULT_FEE};

    fn utxo(key: &KeyMaterial, n: u8, value: u64) -> UnspentOutput {
        UnspentOutput {
            txid: Txid([n; 32]),
            index: 0,
            value,
            script_pubkey: key.script_pubkey(),
        }
    }

    fn parties() -> (ChainParams, KeyMaterial, KeyMaterial) {
        let chain = ChainParams::testnet();
        let alice = KeyMaterial::generate(&chain);
        let bob = KeyMaterial::generate(&chain);
        (chain, alice, bob)
    }

    #[test]
    fn test_initiate_swap() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let session = orchestrator
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 100_050_000)])
            .unwrap();

        assert_eq!(session.role(), SwapRole::Initiator);
        assert_eq!(session.amount(), COIN);
        assert_eq!(session.funding().change(), Some(40_000));
        assert_eq!(session.contract().depositor_pubkey(), alice.public_key_bytes().as_slice());
        assert_eq!(session.contract().recipient_pubkey(), bob.public_key_bytes().as_slice());
        assert_eq!(session.refund().lock_time() as u64, session.created_at() + 48 * 3600);
        assert_eq!(session.refund().refund_value(), COIN - DEFAULT_FEE);

        let preimage = session.reveal_preimage().unwrap();
        assert!(verify_preimage(preimage, session.digest()));
    }

    #[test]
    fn test_preimages_are_fresh() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let utxos = [utxo(&alice, 1, 2 * COIN)];
        let first = orchestrator.initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &utxos).unwrap();
        let second = orchestrator.initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &utxos).unwrap();

        assert_ne!(first.digest(), second.digest());
        assert_ne!(first.preimage_hex().unwrap(), second.preimage_hex().unwrap());
    }

    #[test]
    fn test_respond_swap_uses_digest_only() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let digest_hex = hex::encode([8u8; 32]);
        let session = orchestrator
            .respond_swap(&chain, &bob, &alice.public_key_hex(), &digest_hex, COIN, &[utxo(&bob, 2, 2 * COIN)])
            .unwrap();

        assert_eq!(session.role(), SwapRole::Responder);
        assert_eq!(session.digest_hex(), digest_hex);
        assert_eq!(session.contract().depositor_pubkey(), bob.public_key_bytes().as_slice());
        assert_eq!(session.contract().recipient_pubkey(), alice.public_key_bytes().as_slice());
        assert_eq!(session.refund().lock_time() as u64, session.created_at() + 24 * 3600);
        assert!(session.reveal_preimage().is_err());
    }

    #[test]
    fn test_offer_hides_preimage() {
        let (chain, alice, bob) = parties();
        let session = SwapOrchestrator::default()
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();
        let json = session.offer().to_json().unwrap();
        assert!(!json.contains(&session.preimage_hex().unwrap()));
        assert!(json.contains(&session.digest_hex()));
    }

    #[test]
    fn test_respond_to_offer() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let initiated = orchestrator
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();

        let responded = orchestrator
            .respond_to_offer(&chain, &bob, &initiated.offer(), COIN, &[utxo(&bob, 2, 2 * COIN)])
            .unwrap();
        assert_eq!(responded.digest(), initiated.digest());
        assert!(responded.refund().lock_time() < initiated.refund().lock_time());

        // Not ours to answer
        let carol = KeyMaterial::generate(&chain);
        assert!(orchestrator
            .respond_to_offer(&chain, &carol, &initiated.offer(), COIN, &[utxo(&carol, 3, 2 * COIN)])
            .is_err());
    }

    #[test]
    fn test_respond_to_offer_checks_funding() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let initiated = orchestrator
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();

        // Funding of some other swap, paying a different contract
        let other = orchestrator
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 4, 2 * COIN)])
            .unwrap();
        let mut offer = initiated.offer();
        offer.funding_tx = other.funding().to_hex();
        let err = orchestrator
            .respond_to_offer(&chain, &bob, &offer, COIN, &[utxo(&bob, 2, 2 * COIN)])
            .unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));

        offer.funding_tx = "zz".to_string();
        assert!(orchestrator
            .respond_to_offer(&chain, &bob, &offer, COIN, &[utxo(&bob, 2, 2 * COIN)])
            .is_err());
    }

    #[test]
    fn test_session_addresses_follow_chain() {
        let bitcoin = ChainParams::bitcoin();
        let testnet = ChainParams::testnet();
        let alice = KeyMaterial::generate(&bitcoin);
        let bob = KeyMaterial::generate(&bitcoin);

        let session = SwapOrchestrator::default()
            .initiate_swap(&testnet, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();
        assert_eq!(session.chain(), &testnet);
        assert_eq!(session.refund_address(), alice.for_chain(&testnet).address());
        assert_ne!(session.refund_address(), alice.address());
        assert_eq!(session.contract_address(), session.contract().p2sh_address(&testnet));
    }

    #[test]
    fn test_cosign_round() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let mut session = orchestrator
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();
        assert!(!session.refund().is_final());

        let response = orchestrator.cosign_counterparty_refund(&bob, &session.cosign_request()).unwrap();
        session.accept_cosigned_refund(&response).unwrap();
        assert!(session.refund().is_final());
        assert!(session.refund().verify(session.contract()).unwrap());
    }

    #[test]
    fn test_rejects_partial_response() {
        let (chain, alice, bob) = parties();
        let mut session = SwapOrchestrator::default()
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();
        let echoed = CosignResponse::new(session.refund());
        assert!(session.accept_cosigned_refund(&echoed).is_err());
    }

    #[test]
    fn test_insufficient_funds_bubbles_up() {
        let (chain, alice, bob) = parties();
        let err = SwapOrchestrator::default()
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, COIN)])
            .unwrap_err();
        assert!(matches!(err, SwapError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SwapConfig {
            responder_refund_hours: 48,
            ..SwapConfig::default()
        };
        assert!(matches!(SwapOrchestrator::new(config), Err(SwapError::InvalidTimeout(_))));
    }

    #[test]
    fn test_claim_is_unimplemented() {
        let (chain, alice, bob) = parties();
        let orchestrator = SwapOrchestrator::default();
        let session = orchestrator
            .initiate_swap(&chain, &alice, &bob.public_key_hex(), COIN, &[utxo(&alice, 1, 2 * COIN)])
            .unwrap();
        let preimage = session.reveal_preimage().unwrap().clone();
        assert_eq!(
            orchestrator.claim_swap(&session, &bob, &preimage).unwrap_err(),
            SwapError::ClaimUnimplemented
        );
    }
}
