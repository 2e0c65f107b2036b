fn main() {
    mirage::main()
}
