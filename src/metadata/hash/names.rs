//! Name hashes of metadata records.
//!
//! A top-level type hashes its namespace-qualified name, built by appending every parent
//! namespace followed by a `.` and finally the simple name. A nested type never hashes its
//! qualified name: its hash is [`super::nested_type_hash`] of the enclosing type's hash and its
//! own simple name hash. References to types of other modules follow the same rules through
//! `NamespaceReference` and enclosing `TypeReference` parents, so a reference hashes exactly
//! like the definition it refers to.

use crate::{
    metadata::{
        handle::{Handle, HandleType},
        hash::{name_hash, nested_type_hash, NameHashBuilder},
        reader::MetadataReader,
    },
    Result,
};

/// Parent chains deeper than this are treated as malformed
const MAX_DEPTH: usize = 128;

/// Hash of the `TypeDefinition` behind `handle`.
///
/// # Errors
/// Returns reader errors, or a format error for cyclic or overly deep parent chains.
pub fn type_definition_hash<R: MetadataReader + ?Sized>(reader: &R, handle: Handle) -> Result<u32> {
    type_definition_hash_at(reader, handle, 0)
}

fn type_definition_hash_at<R: MetadataReader + ?Sized>(
    reader: &R,
    handle: Handle,
    depth: usize,
) -> Result<u32> {
    check_depth(depth, handle)?;
    let definition = reader.type_definition(handle)?;
    let name = reader.string(definition.name)?;

    if definition.flags.is_nested() {
        let enclosing = type_definition_hash_at(reader, definition.enclosing_type, depth + 1)?;
        return Ok(nested_type_hash(enclosing, name_hash(&name)));
    }

    let mut builder = NameHashBuilder::new();
    append_namespace_definition(&mut builder, reader, definition.namespace_definition, depth + 1)?;
    builder.append(&name);
    Ok(builder.finish())
}

fn append_namespace_definition<R: MetadataReader + ?Sized>(
    builder: &mut NameHashBuilder,
    reader: &R,
    handle: Handle,
    depth: usize,
) -> Result<()> {
    check_depth(depth, handle)?;
    let namespace = reader.namespace_definition(handle)?;
    if namespace.parent_scope_or_namespace.is(HandleType::NamespaceDefinition) {
        append_namespace_definition(builder, reader, namespace.parent_scope_or_namespace, depth + 1)?;
        builder.append(&reader.string(namespace.name)?);
        builder.append(".");
    }
    Ok(())
}

/// Hash of the `TypeReference` behind `handle`.
///
/// # Errors
/// Returns reader errors, or a format error for cyclic or overly deep parent chains.
pub fn type_reference_hash<R: MetadataReader + ?Sized>(reader: &R, handle: Handle) -> Result<u32> {
    type_reference_hash_at(reader, handle, 0)
}

fn type_reference_hash_at<R: MetadataReader + ?Sized>(
    reader: &R,
    handle: Handle,
    depth: usize,
) -> Result<u32> {
    check_depth(depth, handle)?;
    let reference = reader.type_reference(handle)?;
    let name = reader.string(reference.type_name)?;
    let parent = reference.parent_namespace_or_type;

    if parent.is(HandleType::TypeReference) {
        let enclosing = type_reference_hash_at(reader, parent, depth + 1)?;
        return Ok(nested_type_hash(enclosing, name_hash(&name)));
    }

    let mut builder = NameHashBuilder::new();
    if parent.is(HandleType::NamespaceReference) {
        append_namespace_reference(&mut builder, reader, parent, depth + 1)?;
    }
    builder.append(&name);
    Ok(builder.finish())
}

fn append_namespace_reference<R: MetadataReader + ?Sized>(
    builder: &mut NameHashBuilder,
    reader: &R,
    handle: Handle,
    depth: usize,
) -> Result<()> {
    check_depth(depth, handle)?;
    let namespace = reader.namespace_reference(handle)?;
    if namespace.parent_scope_or_namespace.is(HandleType::NamespaceReference) {
        append_namespace_reference(builder, reader, namespace.parent_scope_or_namespace, depth + 1)?;
        builder.append(&reader.string(namespace.name)?);
        builder.append(".");
    }
    Ok(())
}

/// Dot-joined path of a `NamespaceDefinition`, empty for the root namespace.
///
/// # Errors
/// Returns reader errors, or a format error for cyclic or overly deep parent chains.
pub fn namespace_path<R: MetadataReader + ?Sized>(reader: &R, handle: Handle) -> Result<String> {
    let mut parts = Vec::new();
    let mut current = handle;
    while current.is(HandleType::NamespaceDefinition) {
        check_depth(parts.len(), handle)?;
        let namespace = reader.namespace_definition(current)?;
        if !namespace.parent_scope_or_namespace.is(HandleType::NamespaceDefinition) {
            break;
        }
        parts.push(reader.string(namespace.name)?);
        current = namespace.parent_scope_or_namespace;
    }

    parts.reverse();
    Ok(parts.join("."))
}

/// Dot-joined path of a `NamespaceReference`, empty for a root reference.
///
/// # Errors
/// Returns reader errors, or a format error for cyclic or overly deep parent chains.
pub fn namespace_reference_path<R: MetadataReader + ?Sized>(
    reader: &R,
    handle: Handle,
) -> Result<String> {
    let mut parts = Vec::new();
    let mut current = handle;
    while current.is(HandleType::NamespaceReference) {
        check_depth(parts.len(), handle)?;
        let namespace = reader.namespace_reference(current)?;
        if !namespace.parent_scope_or_namespace.is(HandleType::NamespaceReference) {
            break;
        }
        parts.push(reader.string(namespace.name)?);
        current = namespace.parent_scope_or_namespace;
    }

    parts.reverse();
    Ok(parts.join("."))
}

fn check_depth(depth: usize, handle: Handle) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(malformed_error!(
            "Parent chain of {:?} exceeds {} levels",
            handle,
            MAX_DEPTH
        ));
    }
    Ok(())
}
