//! Registration backends, one per declared resource type.
//!
//! The resource type is always explicit: [`ResourceKind`] is parsed from the
//! type string supplied by the caller and selects a [`Backend`] variant.
//! Every variant implements [`RegistrationBackend`], reading its inputs from
//! the [`Registrar`]'s source or HTTP fetcher and writing through its
//! [`CatalogUpserter`].

use std::{fmt, str::FromStr};

use log::{info, warn};
use registrar_core::{
    CanonicalRecord, CatalogEntry, CatalogStore, CatalogUpserter, Clock, RecordPayload,
    ReplaceHint, SystemClock,
};

use crate::{
    detect::detect_and_harvest,
    dispatch::{ItemRegistration, PreparedItem},
    error::RegistrationError,
    http::HttpFetch,
    normalize::{
        NormalizeContext, cwl, join_url, parse_json, passthrough, required_json_str,
        service::{self, ServiceMode},
        stac,
    },
    source::Source,
    staging::Staging,
};

/// Declared type of a resource submitted for registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// STAC item, dispatched on its assets.
    Item,
    /// STAC collection.
    Collection,
    /// CWL application package.
    Cwl,
    /// Processing service registered as a single record.
    Ades,
    /// Processing service registered with one child record per process.
    Processes,
    /// Remote catalogue harvested by protocol detection.
    Catalogue,
    /// Ready-made ISO 19139 record.
    Iso,
    /// Ready-made JSON record.
    Json,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Item,
        Self::Collection,
        Self::Cwl,
        Self::Ades,
        Self::Processes,
        Self::Catalogue,
        Self::Iso,
        Self::Json,
    ];

    /// Canonical type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Collection => "collection",
            Self::Cwl => "cwl",
            Self::Ades => "ades",
            Self::Processes => "processes",
            Self::Catalogue => "catalogue",
            Self::Iso => "iso",
            Self::Json => "json",
        }
    }

    /// Whether targets of this kind are URLs fetched over HTTP rather than
    /// paths read from the source.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Ades | Self::Processes | Self::Catalogue)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = RegistrationError;

    /// Parse a type string, case-insensitively, accepting common aliases.
    ///
    /// # Examples
    ///
    /// ```
    /// use registrar_data::backend::ResourceKind;
    ///
    /// assert_eq!("STAC-Item".parse::<ResourceKind>()?, ResourceKind::Item);
    /// assert_eq!("oaproc".parse::<ResourceKind>()?, ResourceKind::Processes);
    /// assert!("tarball".parse::<ResourceKind>().is_err());
    /// # Ok::<(), registrar_data::RegistrationError>(())
    /// ```
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "item" | "stac-item" => Ok(Self::Item),
            "collection" | "stac-collection" => Ok(Self::Collection),
            "cwl" | "application" => Ok(Self::Cwl),
            "ades" => Ok(Self::Ades),
            "processes" | "oaproc" => Ok(Self::Processes),
            "catalogue" | "catalog" => Ok(Self::Catalogue),
            "iso" | "iso-xml" => Ok(Self::Iso),
            "json" => Ok(Self::Json),
            _ => Err(RegistrationError::UnknownKind {
                kind: value.to_owned(),
            }),
        }
    }
}

/// Result of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Records were upserted, parent first.
    Registered {
        /// Identifiers written, in upsert order.
        identifiers: Vec<String>,
    },
    /// A catalogue answered no supported protocol; nothing was written.
    NotHarvested,
}

impl RegistrationOutcome {
    /// Identifiers written, empty when nothing was harvested.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        match self {
            Self::Registered { identifiers } => identifiers,
            Self::NotHarvested => &[],
        }
    }
}

/// Capability shared by every backend.
pub trait RegistrationBackend {
    /// Whether the record `target` would produce already exists.
    fn exists(&self, target: &str) -> Result<bool, RegistrationError>;

    /// Read `target`, normalize it and upsert the resulting records.
    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError>;

    /// Delete the record `identifier`, returning the number removed.
    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError>;
}

/// Owns the collaborators every backend draws on.
pub struct Registrar<S, C = SystemClock> {
    upserter: CatalogUpserter<S, C>,
    clock: C,
    source: Box<dyn Source>,
    fetcher: Box<dyn HttpFetch>,
    context: NormalizeContext,
}

impl<S, C> fmt::Debug for Registrar<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<S: CatalogStore> Registrar<S> {
    /// Create a registrar stamping records with the wall clock.
    ///
    /// `context` supplies the settings shared by every registration; its
    /// `now` is refreshed from the clock on each call.
    pub fn new(
        store: S,
        source: Box<dyn Source>,
        fetcher: Box<dyn HttpFetch>,
        context: NormalizeContext,
    ) -> Self {
        Self {
            upserter: CatalogUpserter::new(store),
            clock: SystemClock,
            source,
            fetcher,
            context,
        }
    }
}

impl<S: CatalogStore, C: Clock + Clone> Registrar<S, C> {
    /// Replace the clock used for datestamps and insert timestamps.
    #[must_use]
    pub fn with_clock<D: Clock + Clone>(self, clock: D) -> Registrar<S, D> {
        Registrar {
            upserter: self.upserter.with_clock(clock.clone()),
            clock,
            source: self.source,
            fetcher: self.fetcher,
            context: self.context,
        }
    }

    /// Override the source label stored with inserts.
    #[must_use]
    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.upserter = self.upserter.with_source_label(label);
        self
    }

    /// Borrow the upserter.
    pub const fn upserter(&self) -> &CatalogUpserter<S, C> {
        &self.upserter
    }

    /// Fresh context for one registration.
    #[must_use]
    pub fn context(&self) -> NormalizeContext {
        let mut ctx = self.context.clone();
        ctx.now = self.clock.now();
        ctx
    }

    /// Backend registering resources of `kind`.
    #[must_use]
    pub const fn backend(&self, kind: ResourceKind) -> Backend<'_, S, C> {
        match kind {
            ResourceKind::Item => Backend::Item(ItemBackend { registrar: self }),
            ResourceKind::Collection => Backend::Collection(CollectionBackend { registrar: self }),
            ResourceKind::Cwl => Backend::Cwl(CwlBackend { registrar: self }),
            ResourceKind::Ades => Backend::Service(ServiceBackend {
                registrar: self,
                mode: ServiceMode::Ades,
            }),
            ResourceKind::Processes => Backend::Service(ServiceBackend {
                registrar: self,
                mode: ServiceMode::Processes,
            }),
            ResourceKind::Catalogue => Backend::Catalogue(CatalogueBackend { registrar: self }),
            ResourceKind::Iso => Backend::Passthrough(PassthroughBackend {
                registrar: self,
                format: PassthroughFormat::Iso,
            }),
            ResourceKind::Json => Backend::Passthrough(PassthroughBackend {
                registrar: self,
                format: PassthroughFormat::Json,
            }),
        }
    }

    /// Register `target` with the backend for `kind`.
    pub fn register(
        &self,
        kind: ResourceKind,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        info!("registering {kind} {target}");
        self.backend(kind).register(target, hint)
    }

    /// Deregister `identifier` with the backend for `kind`.
    pub fn deregister(
        &self,
        kind: ResourceKind,
        identifier: &str,
    ) -> Result<usize, RegistrationError> {
        info!("deregistering {kind} {identifier}");
        self.backend(kind).deregister(identifier)
    }

    fn read(&self, path: &str) -> Result<String, RegistrationError> {
        let staging = Staging::new()?;
        let text = staging.read(self.source.as_ref(), path)?;
        staging.close()?;
        Ok(text)
    }

    fn upsert_all(
        &self,
        records: &[CanonicalRecord],
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let mut identifiers = Vec::with_capacity(records.len());
        for record in records {
            let action = self.upserter.upsert(record, hint)?;
            info!("{action:?} {}", record.identifier);
            identifiers.push(record.identifier.clone());
        }
        Ok(RegistrationOutcome::Registered { identifiers })
    }

    fn upsert_payload(
        &self,
        payload: RecordPayload,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let entry = CatalogEntry::try_from(payload)?;
        let action = self.upserter.upsert_entry(&entry, hint)?;
        info!("{action:?} {}", entry.identifier);
        Ok(RegistrationOutcome::Registered {
            identifiers: vec![entry.identifier],
        })
    }

    fn exists_id(&self, identifier: &str) -> Result<bool, RegistrationError> {
        Ok(self.upserter.exists(identifier)?)
    }

    fn delete(&self, identifier: &str) -> Result<usize, RegistrationError> {
        Ok(self.upserter.delete(identifier)?)
    }

    fn delete_children(&self, parent: &str) -> Result<usize, RegistrationError> {
        Ok(self.upserter.delete_children(parent)?)
    }
}

/// Closed set of backends, selected by [`ResourceKind`].
#[derive(Debug)]
pub enum Backend<'a, S, C> {
    /// STAC items.
    Item(ItemBackend<'a, S, C>),
    /// STAC collections.
    Collection(CollectionBackend<'a, S, C>),
    /// CWL application packages.
    Cwl(CwlBackend<'a, S, C>),
    /// Processing services.
    Service(ServiceBackend<'a, S, C>),
    /// Harvested catalogues.
    Catalogue(CatalogueBackend<'a, S, C>),
    /// Verbatim records.
    Passthrough(PassthroughBackend<'a, S, C>),
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for Backend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        match self {
            Self::Item(backend) => backend.exists(target),
            Self::Collection(backend) => backend.exists(target),
            Self::Cwl(backend) => backend.exists(target),
            Self::Service(backend) => backend.exists(target),
            Self::Catalogue(backend) => backend.exists(target),
            Self::Passthrough(backend) => backend.exists(target),
        }
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        match self {
            Self::Item(backend) => backend.register(target, hint),
            Self::Collection(backend) => backend.register(target, hint),
            Self::Cwl(backend) => backend.register(target, hint),
            Self::Service(backend) => backend.register(target, hint),
            Self::Catalogue(backend) => backend.register(target, hint),
            Self::Passthrough(backend) => backend.register(target, hint),
        }
    }

    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        match self {
            Self::Item(backend) => backend.deregister(identifier),
            Self::Collection(backend) => backend.deregister(identifier),
            Self::Cwl(backend) => backend.deregister(identifier),
            Self::Service(backend) => backend.deregister(identifier),
            Self::Catalogue(backend) => backend.deregister(identifier),
            Self::Passthrough(backend) => backend.deregister(identifier),
        }
    }
}

/// Registers STAC items through the source adapter dispatcher.
#[derive(Debug)]
pub struct ItemBackend<'a, S, C> {
    registrar: &'a Registrar<S, C>,
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for ItemBackend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        let identifier = match self.registrar.context.item_id.clone() {
            Some(identifier) => identifier,
            None => {
                let item = parse_json(&self.registrar.read(target)?, "STAC item")?;
                required_json_str(&item, "/id", "STAC item")?.to_owned()
            }
        };
        self.registrar.exists_id(&identifier)
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let mut ctx = self.registrar.context();
        if let (Some(_), Some((dir, _))) = (&ctx.base_url, target.rsplit_once('/')) {
            ctx.base_url = Some(ctx.join_url(&format!("{dir}/")));
        }
        let prepared = ItemRegistration::new(self.registrar.source.as_ref(), &ctx).prepare(target)?;
        match prepared {
            PreparedItem::Record(record) => self.registrar.upsert_all(&[*record], hint),
            PreparedItem::Payload(payload) => self.registrar.upsert_payload(payload, hint),
        }
    }

    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        self.registrar.delete(identifier)
    }
}

/// Registers STAC collections.
#[derive(Debug)]
pub struct CollectionBackend<'a, S, C> {
    registrar: &'a Registrar<S, C>,
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for CollectionBackend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        let collection = parse_json(&self.registrar.read(target)?, "STAC collection")?;
        let identifier = required_json_str(&collection, "/id", "STAC collection")?;
        self.registrar.exists_id(identifier)
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let text = self.registrar.read(target)?;
        let record = stac::from_stac_collection(&text, &self.registrar.context())?;
        self.registrar.upsert_all(&[record], hint)
    }

    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        self.registrar.delete(identifier)
    }
}

/// Registers CWL application packages.
#[derive(Debug)]
pub struct CwlBackend<'a, S, C> {
    registrar: &'a Registrar<S, C>,
}

impl<S: CatalogStore, C: Clock + Clone> CwlBackend<'_, S, C> {
    /// Context locating the descriptor at `target`.
    fn context_for(&self, target: &str) -> NormalizeContext {
        let mut ctx = self.registrar.context();
        if ctx.base_url.is_some() {
            ctx.base_url = Some(ctx.join_url(target));
        }
        ctx.public_url = ctx
            .public_url
            .as_deref()
            .map(|public| join_url(&format!("{}/", public.trim_end_matches('/')), target));
        ctx
    }
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for CwlBackend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        let identifier = cwl::workflow_identifier(&self.registrar.read(target)?)?;
        self.registrar.exists_id(&identifier)
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let text = self.registrar.read(target)?;
        let record = cwl::from_cwl(&text, &self.context_for(target))?;
        self.registrar.upsert_all(&[record], hint)
    }

    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        self.registrar.delete(identifier)
    }
}

/// Registers OGC API Processes services.
#[derive(Debug)]
pub struct ServiceBackend<'a, S, C> {
    registrar: &'a Registrar<S, C>,
    mode: ServiceMode,
}

impl<S: CatalogStore, C: Clock + Clone> ServiceBackend<'_, S, C> {
    fn process_list(&self, service_url: &str) -> Result<Option<String>, RegistrationError> {
        if !self.mode.includes_processes() {
            return Ok(None);
        }
        let url = service::processes_url(service_url);
        Ok(Some(self.registrar.fetcher.get(&url)?.body))
    }
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for ServiceBackend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        self.registrar.exists_id(target)
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let landing = self.registrar.fetcher.get(target)?.body;
        let processes = self.process_list(target)?;
        let records = service::from_service(
            target,
            &landing,
            processes.as_deref(),
            &self.registrar.context(),
        )?;
        self.registrar.upsert_all(&records, hint)
    }

    /// Delete the service record and, in processes mode, every stored
    /// record whose parent is the service.
    ///
    /// Only the catalog is consulted, so a service that no longer answers
    /// can still be removed.
    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        let children = if self.mode.includes_processes() {
            self.registrar.delete_children(identifier)?
        } else {
            0
        };
        Ok(children + self.registrar.delete(identifier)?)
    }
}

/// Registers remote catalogues found by protocol detection.
#[derive(Debug)]
pub struct CatalogueBackend<'a, S, C> {
    registrar: &'a Registrar<S, C>,
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for CatalogueBackend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        self.registrar.exists_id(target)
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let Some(description) = detect_and_harvest(self.registrar.fetcher.as_ref(), target) else {
            warn!("catalogue {target} was not harvested; no record written");
            return Ok(RegistrationOutcome::NotHarvested);
        };
        let record = description.into_record(&self.registrar.context());
        self.registrar.upsert_all(&[record], hint)
    }

    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        self.registrar.delete(identifier)
    }
}

/// Encoding of a verbatim record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughFormat {
    /// ISO 19139 XML.
    Iso,
    /// JSON with a string `id`.
    Json,
}

/// Upserts records that are already in a catalog encoding.
#[derive(Debug)]
pub struct PassthroughBackend<'a, S, C> {
    registrar: &'a Registrar<S, C>,
    format: PassthroughFormat,
}

impl<S: CatalogStore, C: Clock + Clone> PassthroughBackend<'_, S, C> {
    fn payload(&self, target: &str) -> Result<RecordPayload, RegistrationError> {
        let text = self.registrar.read(target)?;
        let payload = match self.format {
            PassthroughFormat::Iso => passthrough::iso_xml(&text)?,
            PassthroughFormat::Json => passthrough::json(&text)?,
        };
        Ok(payload)
    }
}

impl<S: CatalogStore, C: Clock + Clone> RegistrationBackend for PassthroughBackend<'_, S, C> {
    fn exists(&self, target: &str) -> Result<bool, RegistrationError> {
        let entry = CatalogEntry::try_from(self.payload(target)?)?;
        self.registrar.exists_id(&entry.identifier)
    }

    fn register(
        &self,
        target: &str,
        hint: ReplaceHint,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        self.registrar.upsert_payload(self.payload(target)?, hint)
    }

    fn deregister(&self, identifier: &str) -> Result<usize, RegistrationError> {
        self.registrar.delete(identifier)
    }
}
