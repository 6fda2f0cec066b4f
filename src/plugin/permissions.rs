//! Runtime permission gate consulted before locating.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CoarseLocation,
    FineLocation,
}

/// Everything the plugin needs before it may locate.
pub const LOCATION_PERMISSIONS: [Permission; 2] = [Permission::CoarseLocation, Permission::FineLocation];

/// Request code for a bare permission check.
pub const PERMISSION_REQUEST: i32 = 0;
/// Request code for a permission prompt that should locate once granted.
pub const LOCATE_REQUEST: i32 = 1;

/// Host permission service. `request` is asynchronous: the answer comes back
/// through `GeolocationPlugin::on_permission_result`.
pub trait PermissionGate: Send {
    fn has_permission(&self, permission: Permission) -> bool;
    fn request(&mut self, request_code: i32, permissions: &[Permission]);

    fn has_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(*p))
    }
}

/// A fixed grant set. Records the request codes it was asked for.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    granted: HashSet<Permission>,
    requests: Vec<i32>,
}

impl StaticPermissions {
    pub fn all() -> Self {
        Self { granted: LOCATION_PERMISSIONS.into_iter().collect(), requests: Vec::new() }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, permission: Permission) {
        self.granted.insert(permission);
    }

    pub fn requests(&self) -> &[i32] {
        &self.requests
    }
}

impl PermissionGate for StaticPermissions {
    fn has_permission(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    fn request(&mut self, request_code: i32, _permissions: &[Permission]) {
        self.requests.push(request_code);
    }
}
