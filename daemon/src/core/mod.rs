pub mod block_builder;
pub mod block_storage;
pub mod checker;
pub mod contract_info;
pub mod dirty_contract;
pub mod dispatcher;
pub mod election;
pub mod error;
pub mod executor;
pub mod pack_dispatch;
pub mod packager;
pub mod peers;
pub mod prehash;
pub mod runtime;
pub mod storage;
pub mod transaction_cache;
pub mod validation;
pub mod vrf_registry;
