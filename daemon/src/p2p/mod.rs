pub mod messaging;
pub mod packet;

use std::sync::Arc;

use crest_common::{crypto::Address, serializer::Serializer};

use crate::core::{
    error::BlockchainError, packager, prehash, runtime::RuntimeContext, storage::Storage,
};
use packet::Packet;

/// Route an inbound packet to its handler.
pub async fn handle_packet<S: Storage>(
    ctx: &Arc<RuntimeContext<S>>,
    packet: Packet,
    from: Address,
) -> Result<(), BlockchainError> {
    match packet {
        Packet::ContractPackager(msg) => {
            packager::handle_contract_packager_msg(ctx, msg, from).await
        }
        Packet::SeekContractPreHashRequest(request) => {
            prehash::handle_seek_prehash_request(ctx, request).await
        }
        Packet::SeekContractPreHashResponse(response) => {
            let bytes = response.to_bytes();
            ctx.responses.add_response(&response.msg_id, bytes);
            Ok(())
        }
    }
}
