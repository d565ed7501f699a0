// Runtime wiring.
//
// Every collaborator the core talks to is bundled here and passed down by
// Arc, so components stay constructible in isolation. Lock order when more
// than one cache is held: contract pool, then contract-info cache, then
// dirty-contract registry.

use std::sync::Arc;

use crest_common::{
    contract::ContractVm,
    crypto::{Address, KeyPair},
};

use crate::core::{
    block_builder::BlockHandler,
    block_storage::BlockStorage,
    contract_info::ContractInfoCache,
    dirty_contract::DirtyContractRegistry,
    dispatcher::ContractDispatcher,
    election::PackerElection,
    peers::PeerProvider,
    storage::Storage,
    transaction_cache::TransactionCache,
    vrf_registry::VrfRegistry,
};
use crate::p2p::messaging::{MessageSender, ResponseCollector};

pub struct RuntimeContext<S: Storage> {
    pub storage: Arc<S>,
    pub block_storage: Arc<dyn BlockStorage>,
    pub messenger: Arc<dyn MessageSender>,
    pub responses: Arc<ResponseCollector>,
    pub vm: Arc<dyn ContractVm>,
    pub peers: Arc<dyn PeerProvider>,
    pub election: Arc<dyn PackerElection>,
    pub consensus: Arc<dyn BlockHandler>,
    pub keypair: Arc<KeyPair>,

    pub tx_cache: Arc<TransactionCache>,
    pub dispatcher: Arc<ContractDispatcher>,
    pub dirty_contracts: Arc<DirtyContractRegistry>,
    pub contract_info: Arc<ContractInfoCache>,
    pub vrf_registry: Arc<VrfRegistry>,

    /// Serializes inbound packager messages: one handler at a time.
    pub packager_lock: tokio::sync::Mutex<()>,

    self_address: Address,
}

impl<S: Storage> RuntimeContext<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<S>,
        block_storage: Arc<dyn BlockStorage>,
        messenger: Arc<dyn MessageSender>,
        vm: Arc<dyn ContractVm>,
        peers: Arc<dyn PeerProvider>,
        election: Arc<dyn PackerElection>,
        consensus: Arc<dyn BlockHandler>,
        keypair: KeyPair,
    ) -> Arc<Self> {
        let self_address = Address::from_public_key(&keypair.public_key());
        Arc::new(Self {
            storage,
            block_storage,
            messenger,
            responses: Arc::new(ResponseCollector::new()),
            vm,
            peers,
            election,
            consensus,
            keypair: Arc::new(keypair),
            tx_cache: Arc::new(TransactionCache::new()),
            dispatcher: Arc::new(ContractDispatcher::new()),
            dirty_contracts: Arc::new(DirtyContractRegistry::new()),
            contract_info: Arc::new(ContractInfoCache::new()),
            vrf_registry: Arc::new(VrfRegistry::new()),
            packager_lock: tokio::sync::Mutex::new(()),
            self_address,
        })
    }

    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    /// Stop the background loops; in-flight rounds finish on their own.
    pub fn shutdown(&self) {
        self.tx_cache.stop();
        self.dispatcher.stop();
    }
}

/// Launch the node's background loops: the ordinary-pool builder and the
/// contract dispatcher.
pub fn start_background_tasks<S: Storage>(ctx: &Arc<RuntimeContext<S>>) {
    crate::core::transaction_cache::start_ordinary_builder(ctx.clone());
    crate::core::dispatcher::start_dispatcher(ctx.clone());
}
