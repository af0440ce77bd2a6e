//! Dispatch of contract messages through an ordered chain of handlers.

use crate::{
    address::AccountAddress,
    context::Context,
    encoders::MessageEncoders,
    error::Error,
    ibc::{channel_capability_path, CapabilityKeeper, ChannelKeeper, Height, Packet},
    ledger::RouterResponse,
    msgs::HostMsg,
};
use cosmwasm_std::{Binary, Event};
use std::rc::Rc;
use wasmplus_vm::{CosmosMsg, IbcMsg};

/// Events and per host message data of one dispatched contract message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchResponse {
    pub events: Vec<Event>,
    pub data: Vec<Option<Binary>>,
}

/// What a handler may touch while dispatching.
pub trait DispatchHost {
    /// Execute a host message through the router.
    fn route(&mut self, ctx: &mut Context, msg: &HostMsg) -> Result<RouterResponse, Error>;

    fn channel_keeper(&mut self) -> &mut dyn ChannelKeeper;

    fn capability_keeper(&self) -> &dyn CapabilityKeeper;
}

pub trait MessageHandler {
    /// `Ok(None)` when the message is not for this handler.
    fn dispatch_msg(
        &self,
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        contract: &AccountAddress,
        contract_ibc_port_id: &str,
        msg: &CosmosMsg,
    ) -> Result<Option<DispatchResponse>, Error>;
}

/// Encodes a message into host messages and routes each of them.
pub struct SdkMessageHandler {
    encoders: MessageEncoders,
}

impl SdkMessageHandler {
    pub fn new(encoders: MessageEncoders) -> Self {
        SdkMessageHandler { encoders }
    }

    fn handle_sdk_message(
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        contract: &AccountAddress,
        msg: &HostMsg,
    ) -> Result<RouterResponse, Error> {
        msg.validate_basic()?;
        // a contract can only sign for itself
        for signer in msg.signers()? {
            if &signer != contract {
                return Err(Error::Unauthorized("contract doesn't have permission".into()));
            }
        }
        host.route(ctx, msg)
    }
}

impl MessageHandler for SdkMessageHandler {
    fn dispatch_msg(
        &self,
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        contract: &AccountAddress,
        contract_ibc_port_id: &str,
        msg: &CosmosMsg,
    ) -> Result<Option<DispatchResponse>, Error> {
        let Some(sdk_msgs) = self.encoders.encode(contract, contract_ibc_port_id, msg)? else {
            return Ok(None);
        };
        let mut response = DispatchResponse::default();
        for sdk_msg in &sdk_msgs {
            let res = Self::handle_sdk_message(host, ctx, contract, sdk_msg)?;
            response.data.push(res.data);
            response.events.extend(res.events);
        }
        Ok(Some(response))
    }
}

/// Sends raw packets over channels owned by the contract.
#[derive(Default)]
pub struct IbcRawPacketHandler;

impl MessageHandler for IbcRawPacketHandler {
    fn dispatch_msg(
        &self,
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        _contract: &AccountAddress,
        contract_ibc_port_id: &str,
        msg: &CosmosMsg,
    ) -> Result<Option<DispatchResponse>, Error> {
        let CosmosMsg::Ibc(IbcMsg::SendPacket {
            channel_id,
            data,
            timeout,
        }) = msg
        else {
            return Ok(None);
        };
        if contract_ibc_port_id.is_empty() {
            return Err(Error::UnsupportedForContract("ibc not supported".into()));
        }
        if channel_id.is_empty() {
            return Err(Error::Empty("ibc channel".into()));
        }
        let sequence = host
            .channel_keeper()
            .get_next_sequence_send(contract_ibc_port_id, channel_id)
            .ok_or_else(|| Error::SequenceSendNotFound {
                port: contract_ibc_port_id.to_owned(),
                channel: channel_id.clone(),
            })?;
        let channel = host
            .channel_keeper()
            .get_channel(contract_ibc_port_id, channel_id)
            .ok_or_else(|| Error::ChannelNotFound {
                port: contract_ibc_port_id.to_owned(),
                channel: channel_id.clone(),
            })?;
        let capability = host
            .capability_keeper()
            .get_capability(&channel_capability_path(contract_ibc_port_id, channel_id))
            .ok_or_else(|| {
                Error::ChannelCapabilityNotFound("module does not own channel capability".into())
            })?;
        let packet = Packet {
            sequence,
            source_port: contract_ibc_port_id.to_owned(),
            source_channel: channel_id.clone(),
            destination_port: channel.counterparty.port_id,
            destination_channel: channel.counterparty.channel_id,
            data: data.clone(),
            timeout_height: Height::from(timeout.block),
            timeout_timestamp: timeout.timestamp.unwrap_or_default(),
        };
        host.channel_keeper().send_packet(ctx, &capability, packet)?;
        Ok(Some(DispatchResponse::default()))
    }
}

/// A handler supplied as a plain function.
pub struct FnMessageHandler<F>(pub F);

impl<F> MessageHandler for FnMessageHandler<F>
where
    F: Fn(&mut dyn DispatchHost, &mut Context, &AccountAddress, &str, &CosmosMsg) -> Result<Option<DispatchResponse>, Error>,
{
    fn dispatch_msg(
        &self,
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        contract: &AccountAddress,
        contract_ibc_port_id: &str,
        msg: &CosmosMsg,
    ) -> Result<Option<DispatchResponse>, Error> {
        (self.0)(host, ctx, contract, contract_ibc_port_id, msg)
    }
}

/// Tries its handlers in order. The first one that accepts the message wins.
#[derive(Clone)]
pub struct MessageHandlerChain {
    handlers: Vec<Rc<dyn MessageHandler>>,
}

impl MessageHandlerChain {
    pub fn new(first: Rc<dyn MessageHandler>, others: impl IntoIterator<Item = Rc<dyn MessageHandler>>) -> Self {
        let mut handlers = vec![first];
        handlers.extend(others);
        MessageHandlerChain { handlers }
    }

    /// SDK messages first, then raw packets.
    pub fn with_defaults(encoders: MessageEncoders) -> Self {
        Self::new(
            Rc::new(SdkMessageHandler::new(encoders)),
            [Rc::new(IbcRawPacketHandler) as Rc<dyn MessageHandler>],
        )
    }

    /// Dispatch through the chain. A message no handler accepts is
    /// [`Error::UnknownMsg`].
    pub fn dispatch(
        &self,
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        contract: &AccountAddress,
        contract_ibc_port_id: &str,
        msg: &CosmosMsg,
    ) -> Result<DispatchResponse, Error> {
        self.dispatch_msg(host, ctx, contract, contract_ibc_port_id, msg)?
            .ok_or_else(|| Error::UnknownMsg("no handler found".into()))
    }
}

impl MessageHandler for MessageHandlerChain {
    fn dispatch_msg(
        &self,
        host: &mut dyn DispatchHost,
        ctx: &mut Context,
        contract: &AccountAddress,
        contract_ibc_port_id: &str,
        msg: &CosmosMsg,
    ) -> Result<Option<DispatchResponse>, Error> {
        for handler in &self.handlers {
            if let Some(response) =
                handler.dispatch_msg(host, ctx, contract, contract_ibc_port_id, msg)?
            {
                return Ok(Some(response));
            }
            log::debug!("handler skipped {} message", msg.kind());
        }
        Ok(None)
    }
}
