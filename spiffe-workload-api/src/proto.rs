//! SPIFFE Workload API v1 protobuf messages.
//!
//! Hand-maintained mirror of `workload.proto`, kept in the shape
//! `prost-build` would generate so the crate builds without a protoc
//! toolchain or network access. Field numbers follow the published
//! schema and must not change.

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct X509svidRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct X509svidResponse {
    /// SVIDs the workload may act as; the first is the default.
    #[prost(message, repeated, tag = "1")]
    pub svids: ::prost::alloc::vec::Vec<X509svid>,
    /// DER-encoded certificate revocation lists.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub crl: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    /// CA bundles of federated trust domains, keyed by trust domain
    /// name; values are concatenated DER certificates.
    #[prost(map = "string, bytes", tag = "3")]
    pub federated_bundles:
        ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct X509svid {
    /// SPIFFE ID of the SVID.
    #[prost(string, tag = "1")]
    pub spiffe_id: ::prost::alloc::string::String,
    /// Certificate chain as concatenated DER, leaf first.
    #[prost(bytes = "vec", tag = "2")]
    pub x509_svid: ::prost::alloc::vec::Vec<u8>,
    /// PKCS#8 DER private key for the leaf.
    #[prost(bytes = "vec", tag = "3")]
    pub x509_svid_key: ::prost::alloc::vec::Vec<u8>,
    /// CA bundle of the issuing trust domain, concatenated DER.
    #[prost(bytes = "vec", tag = "4")]
    pub bundle: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "5")]
    pub hint: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct X509BundlesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct X509BundlesResponse {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub crl: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(map = "string, bytes", tag = "2")]
    pub bundles:
        ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JwtsvidRequest {
    #[prost(string, repeated, tag = "1")]
    pub audience: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Restricts the response to a single SPIFFE ID; empty means all.
    #[prost(string, tag = "2")]
    pub spiffe_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JwtsvidResponse {
    #[prost(message, repeated, tag = "1")]
    pub svids: ::prost::alloc::vec::Vec<Jwtsvid>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Jwtsvid {
    #[prost(string, tag = "1")]
    pub spiffe_id: ::prost::alloc::string::String,
    /// Compact-serialized JWT.
    #[prost(string, tag = "2")]
    pub svid: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub hint: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct JwtBundlesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JwtBundlesResponse {
    /// JWKS document per trust domain.
    #[prost(map = "string, bytes", tag = "1")]
    pub bundles:
        ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::vec::Vec<u8>>,
}
