use crate::metadata::{
    flags::{MethodAttributes, TypeAttributes},
    handle::Handle,
    memory::{MemoryMetadata, MetadataBuilder},
};

/// Handles of the records created by [`widget_metadata`]
#[derive(Debug, Clone, Copy)]
pub struct WidgetHandles {
    pub scope: Handle,
    pub namespace: Handle,
    pub widget: Handle,
    pub run: Handle,
}

/// Scope `App` with the single type `MyNs.Widget` and its method `Widget Run()`
pub fn widget_metadata() -> (MemoryMetadata, WidgetHandles) {
    let mut builder = MetadataBuilder::new();
    let scope = builder.scope("App");
    let root = builder
        .root_namespace(scope)
        .expect("a fresh scope has a root namespace");
    let namespace = builder.namespace(root, "MyNs");
    let widget = builder.type_definition(namespace, "Widget", TypeAttributes::PUBLIC);
    let run = builder.method(widget, "Run", MethodAttributes::PUBLIC, widget, &[]);

    (
        builder.build(),
        WidgetHandles {
            scope,
            namespace,
            widget,
            run,
        },
    )
}
