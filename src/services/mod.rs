pub mod local_signer;
pub mod object_store_client;
pub mod storage_service;
