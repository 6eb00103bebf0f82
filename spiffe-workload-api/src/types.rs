use std::collections::HashMap;

/// Name of a SPIFFE trust domain, e.g. `example.org`.
pub type TrustDomain = String;

/// An X.509 SVID together with its key material and issuing bundle.
///
/// Certificate fields hold raw DER; nothing here is verified. Callers
/// that need to validate the chain hand each certificate to their own
/// X.509 machinery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X509Svid {
    /// SPIFFE ID of the identity, as a URI string.
    pub spiffe_id: String,
    /// Certificate chain, leaf first, then intermediates.
    pub chain: Vec<Vec<u8>>,
    /// Private key for the leaf, PKCS#8 DER.
    pub private_key: Vec<u8>,
    /// CA certificates of the issuing trust domain.
    pub bundle: Vec<Vec<u8>>,
    /// Operator-assigned hint distinguishing multiple identities.
    pub hint: String,
}

/// One `FetchX509SVID` stream update.
///
/// The first SVID is the workload's default identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X509SvidContext {
    pub svids: Vec<X509Svid>,
    /// Revocation lists, DER, passed through verbatim.
    pub crl: Vec<Vec<u8>>,
    /// CA certificates of federated trust domains.
    pub federated_bundles: HashMap<TrustDomain, Vec<Vec<u8>>>,
}

/// One `FetchX509Bundles` stream update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X509BundlesContext {
    pub crl: Vec<Vec<u8>>,
    pub bundles: HashMap<TrustDomain, Vec<Vec<u8>>>,
}

/// A JWT SVID in compact serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwtSvid {
    pub spiffe_id: String,
    /// The JWT itself, compact-serialized.
    pub svid: String,
    pub hint: String,
}

/// One `FetchJWTBundles` stream update: a JWKS document per trust
/// domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwtBundles {
    pub bundles: HashMap<TrustDomain, Vec<u8>>,
}
