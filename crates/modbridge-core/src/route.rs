//! Typed view of the verb/path combinations both sides understand.
//!
//! Paths follow `/api/<resource>` for collections and `/api/<resource>/<uuid>`
//! for single entities. Anything else is kept as [`Operation::Unknown`] so an
//! implementation can still serve it by hand.

use crate::{Args, Method, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Networks,
    Devices,
    Points,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Networks, Resource::Devices, Resource::Points];

    /// Path segment naming this resource.
    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Networks => "networks",
            Resource::Devices => "devices",
            Resource::Points => "points",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.segment() == segment)
    }

    pub fn collection_path(&self) -> String {
        format!("/api/{}", self.segment())
    }

    pub fn entity_path(&self, uuid: &str) -> String {
        format!("/api/{}/{}", self.segment(), uuid)
    }
}

/// A routed generic call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `GET /api/<resource>/<uuid>`
    Get {
        resource: Resource,
        uuid: String,
        args: Args,
    },
    /// `GET /api/<resource>`
    List { resource: Resource, args: Args },
    /// `POST /api/<resource>` with a JSON body.
    Create { resource: Resource, body: Vec<u8> },
    /// `PATCH` or `PUT /api/<resource>/<uuid>` with a JSON body.
    Update {
        resource: Resource,
        uuid: String,
        body: Vec<u8>,
    },
    /// `DELETE /api/<resource>/<uuid>`
    Delete { resource: Resource, uuid: String },
    Unknown(Request),
}

impl Operation {
    pub fn route(request: Request) -> Self {
        match (request.method, parse_path(&request.path)) {
            (Method::Get, Some((resource, None))) => Operation::List {
                resource,
                args: request.args,
            },
            (Method::Get, Some((resource, Some(uuid)))) => Operation::Get {
                resource,
                uuid,
                args: request.args,
            },
            (Method::Post, Some((resource, None))) => Operation::Create {
                resource,
                body: request.body,
            },
            (Method::Patch | Method::Put, Some((resource, Some(uuid)))) => Operation::Update {
                resource,
                uuid,
                body: request.body,
            },
            (Method::Delete, Some((resource, Some(uuid)))) => Operation::Delete { resource, uuid },
            _ => Operation::Unknown(request),
        }
    }

    pub fn into_request(self) -> Request {
        match self {
            Operation::Get {
                resource,
                uuid,
                args,
            } => Request::new(Method::Get, resource.entity_path(&uuid)).with_args(args),
            Operation::List { resource, args } => {
                Request::new(Method::Get, resource.collection_path()).with_args(args)
            }
            Operation::Create { resource, body } => {
                Request::new(Method::Post, resource.collection_path()).with_body(body)
            }
            Operation::Update {
                resource,
                uuid,
                body,
            } => Request::new(Method::Patch, resource.entity_path(&uuid)).with_body(body),
            Operation::Delete { resource, uuid } => {
                Request::new(Method::Delete, resource.entity_path(&uuid))
            }
            Operation::Unknown(request) => request,
        }
    }
}

fn parse_path(path: &str) -> Option<(Resource, Option<String>)> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["api", resource] => Some((Resource::from_segment(resource)?, None)),
        ["api", resource, uuid] if !uuid.is_empty() => {
            Some((Resource::from_segment(resource)?, Some(uuid.to_string())))
        }
        _ => None,
    }
}
