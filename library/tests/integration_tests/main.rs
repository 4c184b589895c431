mod gateway;
mod rpc_client;
