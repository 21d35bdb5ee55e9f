//! Session orchestration: the credential-mutation controller and the
//! startup bootstrap. These are the only writers of the session store.

pub mod bootstrap;
pub mod controller;
