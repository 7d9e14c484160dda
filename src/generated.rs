//! Protocol types generated from `proto/provider.proto`.

tonic::include_proto!("twingate.provider.v1");
